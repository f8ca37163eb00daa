//! Quantization level selection.

use crate::config::QuantConfig;
use crate::error::{MoshiError, Result};
use std::fmt;
use std::str::FromStr;

/// Bit width and grouping used by affine quantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuantSpec {
    pub bits: u32,
    pub group_size: usize,
}

impl QuantSpec {
    /// Number of codes packed into one `u32` word.
    pub fn codes_per_word(&self) -> usize {
        (32 / self.bits) as usize
    }

    /// Largest code value, `2^bits - 1`.
    pub fn max_code(&self) -> u32 {
        (1u32 << self.bits) - 1
    }
}

/// Weight precision of a converted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quantization {
    /// Unquantized bfloat16 weights.
    #[default]
    None,
    Q4,
    Q8,
}

impl Quantization {
    pub const ALL: [Quantization; 3] = [Quantization::None, Quantization::Q4, Quantization::Q8];

    /// Map an optional bit count (`None`, 4 or 8) to a quantization level.
    pub fn from_bits(bits: Option<u32>) -> Result<Self> {
        match bits {
            None => Ok(Quantization::None),
            Some(4) => Ok(Quantization::Q4),
            Some(8) => Ok(Quantization::Q8),
            Some(other) => Err(MoshiError::Validation {
                field: "quantize".to_string(),
                message: format!("unsupported bit width {other}, expected 4 or 8"),
            }),
        }
    }

    pub fn bits(&self) -> Option<u32> {
        self.spec().map(|spec| spec.bits)
    }

    /// Quantization parameters, `None` for bfloat16.
    pub fn spec(&self) -> Option<QuantSpec> {
        match self {
            Quantization::None => None,
            Quantization::Q4 => Some(QuantSpec {
                bits: 4,
                group_size: QuantConfig::Q4_GROUP_SIZE,
            }),
            Quantization::Q8 => Some(QuantSpec {
                bits: 8,
                group_size: QuantConfig::Q8_GROUP_SIZE,
            }),
        }
    }

    /// File name of the converted weights.
    pub fn weight_filename(&self) -> &'static str {
        match self {
            Quantization::None => "model.safetensors",
            Quantization::Q4 => "model.q4.safetensors",
            Quantization::Q8 => "model.q8.safetensors",
        }
    }

    /// Canonical directory name under the models root.
    pub fn model_dir_name(&self) -> &'static str {
        match self {
            Quantization::None => "llm-jp-moshi-mlx-bf16",
            Quantization::Q4 => "llm-jp-moshi-mlx-q4",
            Quantization::Q8 => "llm-jp-moshi-mlx-q8",
        }
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantization::None => write!(f, "bf16"),
            Quantization::Q4 => write!(f, "q4"),
            Quantization::Q8 => write!(f, "q8"),
        }
    }
}

impl FromStr for Quantization {
    type Err = MoshiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "4" | "q4" => Ok(Quantization::Q4),
            "8" | "q8" => Ok(Quantization::Q8),
            "none" | "bf16" => Ok(Quantization::None),
            other => Err(MoshiError::Validation {
                field: "quantize".to_string(),
                message: format!("unknown quantization '{other}', expected 4, 8 or none"),
            }),
        }
    }
}
