//! Expected MLX parameter set of the Moshi LM.

use super::lm_config::{gated_hidden, LmConfig};
use std::collections::BTreeMap;

/// Module type that owns a parameter. Decides quantization eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Linear,
    Embedding,
    Norm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub shape: Vec<usize>,
    pub kind: ParamKind,
}

/// Every parameter name the MLX model holds, with its shape.
#[derive(Debug, Clone, Default)]
pub struct ModelSkeleton {
    params: BTreeMap<String, ParamSpec>,
}

impl ModelSkeleton {
    pub fn from_config(config: &LmConfig) -> Self {
        let mut skeleton = Self::default();
        let dim = config.dim;

        skeleton.embedding("text_emb.weight", config.text_in_vocab(), dim);
        for i in 0..config.n_q {
            skeleton.embedding(&format!("audio_embs.{i}.weight"), config.audio_vocab(), dim);
        }
        skeleton.transformer(
            "transformer",
            config.num_layers,
            dim,
            config.main_feedforward(),
            config.main_gated(),
        );
        skeleton.norm("out_norm.weight", dim);
        skeleton.linear("text_linear.weight", config.text_out_vocab(), dim);

        let depformer_dim = config.depformer_dim;
        for slice in 0..config.num_slices() {
            let prefix = format!("depformer.slices.{slice}");
            let emb_rows = if slice == 0 {
                config.text_in_vocab()
            } else {
                config.audio_vocab()
            };
            skeleton.embedding(&format!("{prefix}.emb.weight"), emb_rows, depformer_dim);
            skeleton.linear(&format!("{prefix}.linear_in.weight"), depformer_dim, dim);
            skeleton.linear(&format!("{prefix}.linear_out.weight"), config.card, depformer_dim);
            skeleton.transformer(
                &format!("{prefix}.transformer"),
                config.depformer_num_layers,
                depformer_dim,
                config.depformer_feedforward(),
                config.depformer_gated(),
            );
        }

        skeleton
    }

    fn insert(&mut self, name: &str, shape: Vec<usize>, kind: ParamKind) {
        self.params.insert(name.to_string(), ParamSpec { shape, kind });
    }

    fn linear(&mut self, name: &str, out_features: usize, in_features: usize) {
        self.insert(name, vec![out_features, in_features], ParamKind::Linear);
    }

    fn embedding(&mut self, name: &str, rows: usize, dim: usize) {
        self.insert(name, vec![rows, dim], ParamKind::Embedding);
    }

    fn norm(&mut self, name: &str, dim: usize) {
        self.insert(name, vec![dim], ParamKind::Norm);
    }

    fn transformer(&mut self, prefix: &str, layers: usize, dim: usize, feedforward: usize, gated: bool) {
        for layer in 0..layers {
            let p = format!("{prefix}.layers.{layer}");
            self.linear(&format!("{p}.self_attn.in_proj.weight"), 3 * dim, dim);
            self.linear(&format!("{p}.self_attn.out_proj.weight"), dim, dim);
            self.norm(&format!("{p}.norm1.weight"), dim);
            self.norm(&format!("{p}.norm2.weight"), dim);
            if gated {
                let hidden = gated_hidden(dim, feedforward);
                self.linear(&format!("{p}.gating.linear_in.weight"), 2 * hidden, dim);
                self.linear(&format!("{p}.gating.linear_out.weight"), dim, hidden);
            } else {
                self.linear(&format!("{p}.gating.linear1.weight"), feedforward, dim);
                self.linear(&format!("{p}.gating.linear2.weight"), dim, feedforward);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.params.iter().map(|(name, spec)| (name.as_str(), spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tiny_config() -> LmConfig {
        LmConfig::from_json(&json!({
            "dim": 64, "text_card": 31, "n_q": 4, "dep_q": 2, "card": 15,
            "num_heads": 4, "num_layers": 2, "hidden_scale": 4.125,
            "depformer_dim": 32, "depformer_dim_feedforward": 132,
            "depformer_num_heads": 2, "depformer_num_layers": 1
        }))
        .unwrap()
    }

    #[test]
    fn test_parameter_count() {
        let skeleton = ModelSkeleton::from_config(&tiny_config());
        // 1 text emb + 4 audio embs + 2 layers * 6 + out_norm + text_linear
        // + 2 slices * (emb, linear_in, linear_out + 1 layer * 6)
        assert_eq!(skeleton.len(), 19 + 18);
    }

    #[test]
    fn test_shapes() {
        let skeleton = ModelSkeleton::from_config(&tiny_config());
        let shape = |name: &str| skeleton.get(name).unwrap().shape.clone();

        assert_eq!(shape("text_emb.weight"), vec![32, 64]);
        assert_eq!(shape("transformer.layers.1.gating.linear_in.weight"), vec![352, 64]);
        assert_eq!(shape("transformer.layers.1.gating.linear_out.weight"), vec![64, 176]);
        assert_eq!(shape("depformer.slices.0.emb.weight"), vec![32, 32]);
        assert_eq!(shape("depformer.slices.1.emb.weight"), vec![16, 32]);
        assert_eq!(shape("depformer.slices.1.linear_out.weight"), vec![15, 32]);
        assert_eq!(
            shape("depformer.slices.0.transformer.layers.0.self_attn.in_proj.weight"),
            vec![96, 32]
        );
        assert_eq!(skeleton.get("out_norm.weight").unwrap().kind, ParamKind::Norm);
    }

    #[test]
    fn test_ungated_layers() {
        let mut config = tiny_config();
        config.gating = "none".to_string();
        let skeleton = ModelSkeleton::from_config(&config);
        assert!(skeleton.contains("transformer.layers.0.gating.linear1.weight"));
        assert!(!skeleton.contains("transformer.layers.0.gating.linear_in.weight"));
        // depformer falls back to the main gating when unset
        assert!(skeleton.contains("depformer.slices.0.transformer.layers.0.gating.linear2.weight"));
    }
}
