//! PyTorch checkpoint names to MLX parameter names.
//!
//! The PyTorch checkpoint stores the depformer as shared modules whose
//! per-step weights are stacked along the first axis. The MLX model keeps one
//! `depformer.slices.<s>` module per step, so stacked projections are split
//! row-wise and step-independent tensors (norms, unstacked linears) are copied
//! into every slice.

use super::lm_config::LmConfig;
use super::skeleton::ModelSkeleton;
use crate::error::{MoshiError, Result, WeightMismatch};
use std::collections::BTreeMap;
use std::ops::Range;

/// Where the data of one MLX parameter comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    /// Checkpoint tensor name.
    pub tensor: String,
    /// Row range along the first axis, when the tensor is split.
    pub rows: Option<Range<usize>>,
    /// Shape after slicing and squeezing.
    pub shape: Vec<usize>,
}

impl SourceRef {
    fn whole(tensor: &str, shape: &[usize]) -> Self {
        Self {
            tensor: tensor.to_string(),
            rows: None,
            shape: shape.to_vec(),
        }
    }

    /// `[1, 1, d]` norm scales become `[d]`.
    fn squeezed(tensor: &str, shape: &[usize]) -> Self {
        Self {
            tensor: tensor.to_string(),
            rows: None,
            shape: vec![shape.iter().product()],
        }
    }

    fn rows(tensor: &str, shape: &[usize], rows: Range<usize>) -> Self {
        let mut sliced = shape.to_vec();
        if let Some(first) = sliced.first_mut() {
            *first = rows.len();
        }
        Self {
            tensor: tensor.to_string(),
            rows: Some(rows),
            shape: sliced,
        }
    }
}

/// Complete, validated assignment of every MLX parameter to its source.
#[derive(Debug, Clone, Default)]
pub struct WeightMap {
    entries: BTreeMap<String, SourceRef>,
}

impl WeightMap {
    /// Map every checkpoint tensor and check the result against `skeleton`.
    ///
    /// Fails with [`MoshiError::WeightMismatch`] listing every missing,
    /// unexpected, and mis-shaped parameter at once.
    pub fn build<'a, I>(tensors: I, config: &LmConfig, skeleton: &ModelSkeleton) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [usize])>,
    {
        let mut entries = BTreeMap::new();
        let mut mismatch = WeightMismatch::default();

        for (name, shape) in tensors {
            for (target, source) in map_tensor(name, shape, config) {
                match skeleton.get(&target) {
                    None => mismatch.unexpected.push(describe(name, &target)),
                    Some(spec) if spec.shape != source.shape => {
                        mismatch
                            .shape_mismatches
                            .push((target, spec.shape.clone(), source.shape));
                    }
                    Some(_) => {
                        if entries.contains_key(&target) {
                            mismatch.unexpected.push(describe(name, &target));
                        } else {
                            entries.insert(target, source);
                        }
                    }
                }
            }
        }

        let mismatched: Vec<&str> = mismatch
            .shape_mismatches
            .iter()
            .map(|(name, _, _)| name.as_str())
            .collect();
        mismatch.missing = skeleton
            .iter()
            .map(|(name, _)| name)
            .filter(|name| !entries.contains_key(*name) && !mismatched.contains(name))
            .map(str::to_string)
            .collect();

        if mismatch.is_empty() {
            Ok(Self { entries })
        } else {
            mismatch.unexpected.sort();
            mismatch.unexpected.dedup();
            mismatch.shape_mismatches.sort();
            Err(MoshiError::WeightMismatch(mismatch))
        }
    }

    pub fn get(&self, parameter: &str) -> Option<&SourceRef> {
        self.entries.get(parameter)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameters in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SourceRef)> {
        self.entries.iter().map(|(name, source)| (name.as_str(), source))
    }
}

fn describe(name: &str, target: &str) -> String {
    if name == target {
        name.to_string()
    } else {
        format!("{name} (as {target})")
    }
}

/// All MLX parameters that checkpoint tensor `name` provides data for.
pub fn map_tensor(name: &str, shape: &[usize], config: &LmConfig) -> Vec<(String, SourceRef)> {
    if let Some(rest) = name.strip_prefix("transformer.layers.") {
        if let Some((layer, suffix)) = rest.split_once('.') {
            let target = format!("transformer.layers.{layer}.{}", layer_suffix(suffix));
            return vec![(target, layer_source(name, suffix, shape))];
        }
    }

    if let Some(rest) = name.strip_prefix("depformer.layers.") {
        if let Some((layer, suffix)) = rest.split_once('.') {
            return map_depformer_layer(name, layer, suffix, shape, config);
        }
    }

    if let Some(index) = indexed(name, "emb.") {
        return vec![(
            format!("audio_embs.{index}.weight"),
            SourceRef::whole(name, shape),
        )];
    }

    if let Some(index) = indexed(name, "depformer_emb.") {
        return vec![(
            format!("depformer.slices.{}.emb.weight", index + 1),
            SourceRef::whole(name, shape),
        )];
    }

    if let Some(index) = indexed(name, "linears.") {
        return vec![(
            format!("depformer.slices.{index}.linear_out.weight"),
            SourceRef::whole(name, shape),
        )];
    }

    if let Some(index) = indexed(name, "depformer_in.") {
        if config.depformer_multi_linear {
            return vec![(
                format!("depformer.slices.{index}.linear_in.weight"),
                SourceRef::whole(name, shape),
            )];
        }
        return every_slice(config, |slice| {
            (
                format!("depformer.slices.{slice}.linear_in.weight"),
                SourceRef::whole(name, shape),
            )
        });
    }

    match name {
        "depformer_text_emb.weight" => vec![(
            "depformer.slices.0.emb.weight".to_string(),
            SourceRef::whole(name, shape),
        )],
        "out_norm.alpha" => vec![(
            "out_norm.weight".to_string(),
            SourceRef::squeezed(name, shape),
        )],
        _ => vec![(name.to_string(), SourceRef::whole(name, shape))],
    }
}

/// Index of `<prefix><i>.weight` names.
fn indexed(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix)?
        .strip_suffix(".weight")?
        .parse()
        .ok()
}

fn every_slice<F>(config: &LmConfig, f: F) -> Vec<(String, SourceRef)>
where
    F: Fn(usize) -> (String, SourceRef),
{
    (0..config.num_slices()).map(f).collect()
}

/// Rename a transformer layer parameter suffix to its MLX module path.
fn layer_suffix(suffix: &str) -> String {
    match suffix {
        "self_attn.in_proj_weight" => "self_attn.in_proj.weight".to_string(),
        "norm1.alpha" => "norm1.weight".to_string(),
        "norm2.alpha" => "norm2.weight".to_string(),
        "linear1.weight" => "gating.linear1.weight".to_string(),
        "linear2.weight" => "gating.linear2.weight".to_string(),
        other => other.to_string(),
    }
}

fn layer_source(name: &str, suffix: &str, shape: &[usize]) -> SourceRef {
    if suffix.ends_with(".alpha") {
        SourceRef::squeezed(name, shape)
    } else {
        SourceRef::whole(name, shape)
    }
}

fn map_depformer_layer(
    name: &str,
    layer: &str,
    suffix: &str,
    shape: &[usize],
    config: &LmConfig,
) -> Vec<(String, SourceRef)> {
    let slices = config.num_slices();
    let target = |slice: usize, mlx_suffix: &str| {
        format!("depformer.slices.{slice}.transformer.layers.{layer}.{mlx_suffix}")
    };

    let stacked = matches!(suffix, "self_attn.in_proj_weight" | "self_attn.out_proj.weight");
    if stacked && config.depformer_weights_per_step {
        let mlx_suffix = layer_suffix(suffix);
        let rows = shape.first().copied().unwrap_or(0);
        if rows % slices != 0 {
            // Reported as a shape mismatch on every slice.
            return every_slice(config, |slice| {
                (target(slice, &mlx_suffix), SourceRef::whole(name, shape))
            });
        }
        let chunk = rows / slices;
        return every_slice(config, |slice| {
            (
                target(slice, &mlx_suffix),
                SourceRef::rows(name, shape, slice * chunk..(slice + 1) * chunk),
            )
        });
    }

    if config.depformer_weights_per_step {
        if let Some(rest) = suffix.strip_prefix("gating.") {
            if let Some((step, gating_suffix)) = rest.split_once('.') {
                if let Ok(step) = step.parse::<usize>() {
                    return vec![(
                        target(step, &format!("gating.{gating_suffix}")),
                        SourceRef::whole(name, shape),
                    )];
                }
            }
        }
    }

    let mlx_suffix = layer_suffix(suffix);
    every_slice(config, |slice| {
        (target(slice, &mlx_suffix), layer_source(name, suffix, shape))
    })
}
