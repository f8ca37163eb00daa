//! Typed view over `moshi_lm_kwargs.json`.

use crate::error::{MoshiError, Result};
use serde::Deserialize;
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_gating() -> String {
    "silu".to_string()
}

/// Hyper-parameters of the Moshi language model that determine its
/// parameter names and shapes. Unknown keys (delays, context, rope settings)
/// are ignored here but kept verbatim in the written `config.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LmConfig {
    pub dim: usize,
    pub text_card: usize,
    pub n_q: usize,
    pub dep_q: usize,
    pub card: usize,
    pub num_heads: usize,
    pub num_layers: usize,
    pub hidden_scale: f64,
    #[serde(default = "default_gating")]
    pub gating: String,
    pub depformer_dim: usize,
    #[serde(default)]
    pub depformer_dim_feedforward: Option<usize>,
    pub depformer_num_heads: usize,
    pub depformer_num_layers: usize,
    #[serde(default = "default_true")]
    pub depformer_multi_linear: bool,
    #[serde(default = "default_true")]
    pub depformer_weights_per_step: bool,
    #[serde(default)]
    pub depformer_gating: Option<String>,
}

impl LmConfig {
    pub fn from_json(value: &Value) -> Result<Self> {
        let config: LmConfig = serde_json::from_value(value.clone())
            .map_err(|e| MoshiError::config(format!("invalid LM config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.num_heads == 0 || self.dim % self.num_heads != 0 {
            return Err(MoshiError::config(format!(
                "dim {} is not divisible by num_heads {}",
                self.dim, self.num_heads
            )));
        }
        if self.depformer_num_heads == 0 || self.depformer_dim % self.depformer_num_heads != 0 {
            return Err(MoshiError::config(format!(
                "depformer_dim {} is not divisible by depformer_num_heads {}",
                self.depformer_dim, self.depformer_num_heads
            )));
        }
        if self.dep_q == 0 || self.dep_q > self.n_q {
            return Err(MoshiError::config(format!(
                "dep_q {} must be between 1 and n_q {}",
                self.dep_q, self.n_q
            )));
        }
        Ok(())
    }

    /// Text embedding rows (vocabulary plus the initial token).
    pub fn text_in_vocab(&self) -> usize {
        self.text_card + 1
    }

    pub fn text_out_vocab(&self) -> usize {
        self.text_card
    }

    /// Audio embedding rows (codebook plus the initial token).
    pub fn audio_vocab(&self) -> usize {
        self.card + 1
    }

    pub fn main_feedforward(&self) -> usize {
        (self.hidden_scale * self.dim as f64) as usize
    }

    pub fn depformer_feedforward(&self) -> usize {
        self.depformer_dim_feedforward
            .unwrap_or_else(|| (self.hidden_scale * self.depformer_dim as f64) as usize)
    }

    pub fn main_gated(&self) -> bool {
        is_gated(&self.gating)
    }

    pub fn depformer_gated(&self) -> bool {
        is_gated(self.depformer_gating.as_deref().unwrap_or(&self.gating))
    }

    /// Number of depformer slices, one per generated codebook.
    pub fn num_slices(&self) -> usize {
        self.dep_q
    }
}

fn is_gated(gating: &str) -> bool {
    !matches!(gating, "none" | "")
}

/// Hidden width of a gated MLP for a given model and feed-forward size.
pub fn gated_hidden(dim: usize, feedforward: usize) -> usize {
    if feedforward == 4 * dim {
        (21 * dim) / 8
    } else {
        (2 * feedforward) / 3
    }
}
