//! Element decoding for checkpoint tensors.

use half::{bf16, f16};
use safetensors::Dtype;
use std::borrow::Cow;

/// Floating point dtypes a source checkpoint may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDtype {
    F32,
    F16,
    BF16,
}

impl SourceDtype {
    pub fn from_safetensors(dtype: Dtype) -> Option<Self> {
        match dtype {
            Dtype::F32 => Some(SourceDtype::F32),
            Dtype::F16 => Some(SourceDtype::F16),
            Dtype::BF16 => Some(SourceDtype::BF16),
            _ => None,
        }
    }

    fn decode_bf16(&self, bytes: &[u8]) -> Vec<bf16> {
        match self {
            SourceDtype::F32 => bytes
                .chunks_exact(4)
                .map(|b| bf16::from_f32(f32::from_le_bytes([b[0], b[1], b[2], b[3]])))
                .collect(),
            SourceDtype::F16 => bytes
                .chunks_exact(2)
                .map(|b| bf16::from_f32(f16::from_le_bytes([b[0], b[1]]).to_f32()))
                .collect(),
            SourceDtype::BF16 => bytes
                .chunks_exact(2)
                .map(|b| bf16::from_le_bytes([b[0], b[1]]))
                .collect(),
        }
    }
}

/// Little-endian bfloat16 bytes of a tensor; borrowed when already bf16.
pub fn to_bf16_bytes(dtype: SourceDtype, bytes: &[u8]) -> Cow<'_, [u8]> {
    match dtype {
        SourceDtype::BF16 => Cow::Borrowed(bytes),
        other => Cow::Owned(bf16_bytes(&other.decode_bf16(bytes))),
    }
}

/// Values rounded to bfloat16 first, then widened to f32 for arithmetic.
pub fn to_f32_via_bf16(dtype: SourceDtype, bytes: &[u8]) -> Vec<f32> {
    dtype
        .decode_bf16(bytes)
        .into_iter()
        .map(bf16::to_f32)
        .collect()
}

pub fn bf16_bytes(values: &[bf16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn u32_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
