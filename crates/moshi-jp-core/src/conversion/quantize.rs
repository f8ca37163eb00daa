//! Group-wise affine quantization in the MLX layout.
//!
//! Each run of `group_size` consecutive values along the last axis shares a
//! scale and a bias, and `w ≈ code * scale + bias`. Codes are packed
//! little-endian into `u32` words with the first code in the lowest bits, so
//! a `[rows, cols]` weight becomes `[rows, cols * bits / 32]` words plus
//! `[rows, cols / group_size]` scales and biases.

use super::skeleton::ParamKind;
use crate::config::QuantConfig;
use crate::error::{MoshiError, Result};
use crate::models::QuantSpec;
use half::bf16;

/// Linear and embedding weights are quantized; norms stay in bfloat16.
pub fn is_quantizable(kind: ParamKind) -> bool {
    matches!(kind, ParamKind::Linear | ParamKind::Embedding)
}

/// A quantized weight must be at least 2-D with rows that split evenly into
/// groups.
pub fn check_groups(name: &str, shape: &[usize], spec: QuantSpec) -> Result<()> {
    let row_len = match shape {
        [.., _, cols] => *cols,
        _ => {
            return Err(MoshiError::Quantization {
                tensor: name.to_string(),
                message: format!("shape {shape:?} has no rows to quantize"),
            })
        }
    };
    if row_len == 0 || row_len % spec.group_size != 0 {
        return Err(MoshiError::Quantization {
            tensor: name.to_string(),
            message: format!(
                "last dimension {row_len} is not a multiple of group size {}",
                spec.group_size
            ),
        });
    }
    Ok(())
}

/// Shapes of the packed weight and of the scales/biases for a parameter.
pub fn quantized_shapes(shape: &[usize], spec: QuantSpec) -> (Vec<usize>, Vec<usize>) {
    let mut weight = shape.to_vec();
    let mut groups = shape.to_vec();
    if let Some(cols) = shape.last() {
        let last = shape.len() - 1;
        weight[last] = cols * spec.bits as usize / 32;
        groups[last] = cols / spec.group_size;
    }
    (weight, groups)
}

/// Per-group scale and bias, in f32 before storage rounding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupParams {
    pub scales: Vec<f32>,
    pub biases: Vec<f32>,
}

/// Compute scale and bias of every group of `values`.
///
/// The bias is pinned to whichever extreme has the larger magnitude and the
/// scale is nudged so that extreme is represented exactly.
pub fn group_params(values: &[f32], spec: QuantSpec) -> GroupParams {
    let n_bins = spec.max_code() as f32;
    let groups = values.len() / spec.group_size;
    let mut params = GroupParams {
        scales: Vec::with_capacity(groups),
        biases: Vec::with_capacity(groups),
    };

    for group in values.chunks_exact(spec.group_size) {
        let (w_min, w_max) = group
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        let negative_edge = w_min.abs() > w_max.abs();
        let mut scale = ((w_max - w_min) / n_bins).max(QuantConfig::SCALE_EPSILON);
        if !negative_edge {
            scale = -scale;
        }
        let edge = if negative_edge { w_min } else { w_max };
        let q0 = (edge / scale).round_ties_even();
        let (scale, bias) = if q0 != 0.0 {
            (edge / q0, edge)
        } else {
            (scale, 0.0)
        };

        params.scales.push(scale);
        params.biases.push(bias);
    }
    params
}

/// Quantize `values` against precomputed group parameters and pack the codes.
pub fn pack_codes(values: &[f32], params: &GroupParams, spec: QuantSpec) -> Vec<u32> {
    let n_bins = spec.max_code() as f32;
    let per_word = spec.codes_per_word();
    let mut words = Vec::with_capacity(values.len() / per_word);

    for (g, group) in values.chunks_exact(spec.group_size).enumerate() {
        let scale = params.scales[g];
        let bias = params.biases[g];
        for chunk in group.chunks_exact(per_word) {
            let word = chunk.iter().enumerate().fold(0u32, |word, (j, &v)| {
                let code = ((v - bias) / scale).round_ties_even().clamp(0.0, n_bins) as u32;
                word | (code << (spec.bits as usize * j))
            });
            words.push(word);
        }
    }
    words
}

/// A fully quantized tensor as it is stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    pub weight: Vec<u32>,
    pub scales: Vec<bf16>,
    pub biases: Vec<bf16>,
}

/// Quantize a row-major tensor whose rows are `row_len` values long.
pub fn affine_quantize(
    name: &str,
    values: &[f32],
    row_len: usize,
    spec: QuantSpec,
) -> Result<QuantizedTensor> {
    check_groups(name, &[values.len() / row_len.max(1), row_len], spec)?;
    if values.len() % row_len != 0 {
        return Err(MoshiError::Quantization {
            tensor: name.to_string(),
            message: format!("{} values do not form rows of {row_len}", values.len()),
        });
    }
    Ok(quantize_groups(values, spec))
}

/// Quantize values already known to split into whole groups.
pub fn quantize_groups(values: &[f32], spec: QuantSpec) -> QuantizedTensor {
    let params = group_params(values, spec);
    QuantizedTensor {
        weight: pack_codes(values, &params, spec),
        scales: params.scales.iter().map(|&s| bf16::from_f32(s)).collect(),
        biases: params.biases.iter().map(|&b| bf16::from_f32(b)).collect(),
    }
}

/// Inverse of [`affine_quantize`], using the stored bf16 scales and biases.
pub fn affine_dequantize(tensor: &QuantizedTensor, spec: QuantSpec) -> Vec<f32> {
    let mask = spec.max_code();
    let per_word = spec.codes_per_word();
    let words_per_group = spec.group_size / per_word;

    tensor
        .weight
        .chunks_exact(words_per_group)
        .enumerate()
        .flat_map(|(g, words)| {
            let scale = tensor.scales[g].to_f32();
            let bias = tensor.biases[g].to_f32();
            words.iter().flat_map(move |&word| {
                (0..per_word).map(move |j| {
                    let code = (word >> (spec.bits as usize * j)) & mask;
                    code as f32 * scale + bias
                })
            })
        })
        .collect()
}
