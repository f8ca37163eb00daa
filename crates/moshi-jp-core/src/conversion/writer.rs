//! Lazy MLX weight file writer.
//!
//! The source checkpoint is memory-mapped and every output tensor is a
//! [`View`] that converts its slice of the map only when the serializer asks
//! for the bytes. A quantized parameter is decoded and quantized once; its
//! scales and biases wait in memory until the serializer reaches them.

use super::dtype::{self, SourceDtype};
use super::lm_config::LmConfig;
use super::mapping::{SourceRef, WeightMap};
use super::quantize;
use super::skeleton::ModelSkeleton;
use crate::error::{IoResultExt, MoshiError, Result};
use crate::models::{QuantSpec, Quantization};
use memmap2::Mmap;
use safetensors::tensor::{Dtype, TensorView, View};
use safetensors::SafeTensors;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

/// A read-only memory map of a `.safetensors` checkpoint.
pub struct Checkpoint {
    path: PathBuf,
    mmap: Mmap,
}

impl Checkpoint {
    #[allow(unsafe_code)]
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        // SAFETY: the file is mapped read-only and is a cache blob that no
        // other writer touches while the converter runs.
        let mmap = unsafe { Mmap::map(&file) }.with_path(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn tensors(&self) -> Result<SafeTensors<'_>> {
        SafeTensors::deserialize(&self.mmap).map_err(|e| MoshiError::Safetensors {
            message: format!("{}: {e}", self.path.display()),
        })
    }
}

/// Counts tensors as the serializer pulls them.
#[derive(Debug, Default)]
pub struct WriteProgress {
    total: Cell<usize>,
    done: Cell<usize>,
    last_decile: Cell<usize>,
}

impl WriteProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn done(&self) -> usize {
        self.done.get()
    }

    fn set_total(&self, total: usize) {
        self.total.set(total);
    }

    fn tick(&self, name: &str) {
        let done = self.done.get() + 1;
        self.done.set(done);
        debug!("Converted {}", name);

        let total = self.total.get().max(1);
        let decile = done * 10 / total;
        if decile > self.last_decile.get() {
            self.last_decile.set(decile);
            info!("  {}/{} tensors written", done, total);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Full,
    PackedWeight(QuantSpec),
    Scales(QuantSpec),
    Biases(QuantSpec),
}

/// Quantized pieces of one parameter, shared by its three output tensors.
/// Filled by whichever piece is serialized first; each piece is then moved
/// out by its own tensor.
type SharedQuantized = Rc<RefCell<Option<quantize::QuantizedTensor>>>;

/// One tensor of the output file, computed on demand from the checkpoint.
pub struct OutputTensor<'a> {
    name: String,
    source: TensorView<'a>,
    source_dtype: SourceDtype,
    rows: Option<Range<usize>>,
    part: Part,
    quantized: SharedQuantized,
    dtype: Dtype,
    shape: Vec<usize>,
    progress: &'a WriteProgress,
}

impl<'a> OutputTensor<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn source_bytes(&self) -> &'a [u8] {
        let data = self.source.data();
        match &self.rows {
            Some(rows) => {
                let total_rows = self.source.shape().first().copied().unwrap_or(1).max(1);
                let row_bytes = data.len() / total_rows;
                &data[rows.start * row_bytes..rows.end * row_bytes]
            }
            None => data,
        }
    }

    /// Quantize the source on first use, then move one piece out.
    fn take_quantized<T>(
        &self,
        spec: QuantSpec,
        piece: impl FnOnce(&mut quantize::QuantizedTensor) -> T,
    ) -> T {
        let mut slot = self.quantized.borrow_mut();
        let tensor = slot.get_or_insert_with(|| {
            let values = dtype::to_f32_via_bf16(self.source_dtype, self.source_bytes());
            quantize::quantize_groups(&values, spec)
        });
        piece(tensor)
    }

    fn materialize(&self) -> Cow<'a, [u8]> {
        match self.part {
            Part::Full => dtype::to_bf16_bytes(self.source_dtype, self.source_bytes()),
            Part::PackedWeight(spec) => {
                let weight = self.take_quantized(spec, |q| std::mem::take(&mut q.weight));
                Cow::Owned(dtype::u32_bytes(&weight))
            }
            Part::Scales(spec) => {
                let scales = self.take_quantized(spec, |q| std::mem::take(&mut q.scales));
                Cow::Owned(dtype::bf16_bytes(&scales))
            }
            Part::Biases(spec) => {
                let biases = self.take_quantized(spec, |q| std::mem::take(&mut q.biases));
                Cow::Owned(dtype::bf16_bytes(&biases))
            }
        }
    }
}

impl View for OutputTensor<'_> {
    fn dtype(&self) -> Dtype {
        self.dtype
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> Cow<'_, [u8]> {
        let bytes = self.materialize();
        self.progress.tick(&self.name);
        bytes
    }

    fn data_len(&self) -> usize {
        let element = match self.dtype {
            Dtype::U32 => 4,
            _ => 2,
        };
        self.shape.iter().product::<usize>() * element
    }
}

/// Summary of a weight conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeightStats {
    /// Parameters of the MLX model.
    pub parameters: usize,
    /// Parameters stored quantized.
    pub quantized: usize,
    /// Tensors in the output file.
    pub tensors: usize,
}

/// Every output tensor of a conversion, validated and ready to stream.
pub struct ConversionPlan<'a> {
    outputs: Vec<(String, OutputTensor<'a>)>,
    stats: WeightStats,
}

impl<'a> ConversionPlan<'a> {
    /// Map, validate, and schedule every tensor of `checkpoint`.
    ///
    /// All name, shape, and dtype checks happen here, so writing cannot fail
    /// halfway through on bad input.
    pub fn build(
        checkpoint: &SafeTensors<'a>,
        config: &LmConfig,
        quantization: Quantization,
        progress: &'a WriteProgress,
    ) -> Result<Self> {
        let skeleton = ModelSkeleton::from_config(config);
        let views: HashMap<String, TensorView<'a>> = checkpoint.tensors().into_iter().collect();
        let weight_map = WeightMap::build(
            views.iter().map(|(name, view)| (name.as_str(), view.shape())),
            config,
            &skeleton,
        )?;

        match quantization.spec() {
            Some(spec) => info!(
                "Quantization: {}bit (group_size={})",
                spec.bits, spec.group_size
            ),
            None => info!("No quantization (bfloat16)"),
        }

        let mut outputs = Vec::new();
        let mut stats = WeightStats {
            parameters: weight_map.len(),
            ..WeightStats::default()
        };

        for (parameter, source) in weight_map.iter() {
            let view = views
                .get(&source.tensor)
                .cloned()
                .ok_or_else(|| MoshiError::Safetensors {
                    message: format!("tensor {} disappeared from checkpoint", source.tensor),
                })?;
            let source_dtype =
                SourceDtype::from_safetensors(view.dtype()).ok_or_else(|| MoshiError::UnsupportedDtype {
                    tensor: source.tensor.clone(),
                    dtype: format!("{:?}", view.dtype()),
                })?;
            let kind = skeleton
                .get(parameter)
                .map(|spec| spec.kind)
                .ok_or_else(|| MoshiError::config(format!("no skeleton entry for {parameter}")))?;

            let base = OutputTensor {
                name: parameter.to_string(),
                source: view,
                source_dtype,
                rows: source.rows.clone(),
                part: Part::Full,
                quantized: SharedQuantized::default(),
                dtype: Dtype::BF16,
                shape: source.shape.clone(),
                progress,
            };

            match quantization.spec() {
                Some(spec) if quantize::is_quantizable(kind) => {
                    quantize::check_groups(parameter, &source.shape, spec)?;
                    stats.quantized += 1;
                    outputs.extend(quantized_outputs(parameter, source, base, spec));
                }
                _ => outputs.push((parameter.to_string(), base)),
            }
        }

        stats.tensors = outputs.len();
        progress.set_total(outputs.len());
        Ok(Self { outputs, stats })
    }

    pub fn stats(&self) -> WeightStats {
        self.stats
    }

    /// Output tensor names in write order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(name, _)| name.as_str())
    }

    /// Stream every tensor into `path` with `{"format": "mlx"}` metadata.
    pub fn write(self, path: &Path) -> Result<WeightStats> {
        let stats = self.stats;
        let metadata = Some(HashMap::from([("format".to_string(), "mlx".to_string())]));
        safetensors::serialize_to_file(self.outputs, &metadata, path).map_err(|e| {
            MoshiError::Safetensors {
                message: format!("writing {}: {e}", path.display()),
            }
        })?;
        Ok(stats)
    }
}

/// `<p>.weight` becomes packed `<p>.weight` plus `<p>.scales` and `<p>.biases`.
fn quantized_outputs<'a>(
    parameter: &str,
    source: &SourceRef,
    base: OutputTensor<'a>,
    spec: QuantSpec,
) -> Vec<(String, OutputTensor<'a>)> {
    let prefix = parameter.strip_suffix(".weight").unwrap_or(parameter);
    let (weight_shape, group_shape) = quantize::quantized_shapes(&source.shape, spec);

    let make = |name: String, part: Part, dtype: Dtype, shape: &[usize]| {
        let tensor = OutputTensor {
            name: name.clone(),
            source: base.source.clone(),
            source_dtype: base.source_dtype,
            rows: base.rows.clone(),
            part,
            quantized: Rc::clone(&base.quantized),
            dtype,
            shape: shape.to_vec(),
            progress: base.progress,
        };
        (name, tensor)
    };

    vec![
        make(format!("{prefix}.weight"), Part::PackedWeight(spec), Dtype::U32, &weight_shape),
        make(format!("{prefix}.scales"), Part::Scales(spec), Dtype::BF16, &group_shape),
        make(format!("{prefix}.biases"), Part::Biases(spec), Dtype::BF16, &group_shape),
    ]
}

/// Convert the checkpoint at `source` into an MLX weight file at `output`.
///
/// Nothing is written when mapping or validation fails.
pub fn convert_checkpoint(
    source: &Path,
    config: &LmConfig,
    quantization: Quantization,
    output: &Path,
) -> Result<WeightStats> {
    let checkpoint = Checkpoint::open(source)?;
    let tensors = checkpoint.tensors()?;
    let progress = WriteProgress::new();
    let plan = ConversionPlan::build(&tensors, config, quantization, &progress)?;
    let stats = plan.stats();
    info!(
        "  {} parameters, {} quantized, {} output tensors",
        stats.parameters, stats.quantized, stats.tensors
    );

    info!("[5/5] Writing {}", output.display());
    plan.write(output)
}
