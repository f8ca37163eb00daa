//! Tiny synthetic LLM-jp-Moshi checkpoint for integration tests.

#![allow(dead_code)]

use safetensors::tensor::{Dtype, TensorView};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TOKENIZER_FILENAME: &str = "tokenizer_spm_32k_3.model";
pub const MIMI_FILENAME: &str = "tokenizer-e351c8d8-checkpoint125.safetensors";

/// Parameters of the MLX model built from [`lm_kwargs`].
pub const PARAMETER_COUNT: usize = 37;

/// Linear and embedding parameters among them; every one splits into
/// groups of 32 and 64.
pub const QUANTIZED_COUNT: usize = 28;

/// LM kwargs shaped like the real file, scaled down.
pub fn lm_kwargs() -> Value {
    json!({
        "dim": 64,
        "text_card": 31,
        "existing_text_padding_id": 3,
        "n_q": 4,
        "dep_q": 2,
        "card": 15,
        "num_heads": 4,
        "num_layers": 2,
        "hidden_scale": 4.5,
        "causal": true,
        "context": 100,
        "max_period": 10000,
        "gating": "silu",
        "norm": "rms_norm_f32",
        "positional_embedding": "rope",
        "depformer_dim": 64,
        "depformer_dim_feedforward": 192,
        "depformer_num_heads": 2,
        "depformer_num_layers": 1,
        "depformer_multi_linear": true,
        "depformer_context": 2,
        "depformer_gating": "silu",
        "depformer_weights_per_step": true,
        "delays": [0, 0, 1, 1, 1]
    })
}

/// Checkpoint tensor names and shapes in PyTorch layout.
pub fn pytorch_shapes() -> Vec<(String, Vec<usize>)> {
    let mut shapes: Vec<(String, Vec<usize>)> = Vec::new();
    let mut add = |name: String, shape: &[usize]| shapes.push((name, shape.to_vec()));

    add("text_emb.weight".into(), &[32, 64]);
    for i in 0..4 {
        add(format!("emb.{i}.weight"), &[16, 64]);
    }
    for layer in 0..2 {
        let p = format!("transformer.layers.{layer}");
        add(format!("{p}.self_attn.in_proj_weight"), &[192, 64]);
        add(format!("{p}.self_attn.out_proj.weight"), &[64, 64]);
        add(format!("{p}.norm1.alpha"), &[1, 1, 64]);
        add(format!("{p}.norm2.alpha"), &[1, 1, 64]);
        add(format!("{p}.gating.linear_in.weight"), &[384, 64]);
        add(format!("{p}.gating.linear_out.weight"), &[64, 192]);
    }
    add("out_norm.alpha".into(), &[1, 1, 64]);
    add("text_linear.weight".into(), &[31, 64]);

    add("depformer_text_emb.weight".into(), &[32, 64]);
    add("depformer_emb.0.weight".into(), &[16, 64]);
    for slice in 0..2 {
        add(format!("depformer_in.{slice}.weight"), &[64, 64]);
        add(format!("linears.{slice}.weight"), &[15, 64]);
    }
    let p = "depformer.layers.0";
    add(format!("{p}.self_attn.in_proj_weight"), &[2 * 192, 64]);
    add(format!("{p}.self_attn.out_proj.weight"), &[2 * 64, 64]);
    add(format!("{p}.norm1.alpha"), &[1, 1, 64]);
    add(format!("{p}.norm2.alpha"), &[1, 1, 64]);
    for slice in 0..2 {
        add(format!("{p}.gating.{slice}.linear_in.weight"), &[256, 64]);
        add(format!("{p}.gating.{slice}.linear_out.weight"), &[64, 128]);
    }

    shapes
}

/// Deterministic f32 values, distinct per tensor.
pub fn tensor_values(index: usize, count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| ((i as f32 * 0.731 + index as f32 * 1.37).sin()) * 0.05)
        .collect()
}

/// Write `tensors` as an f32 safetensors file.
pub fn write_f32_checkpoint(path: &Path, tensors: &[(String, Vec<usize>)]) {
    let data: Vec<Vec<u8>> = tensors
        .iter()
        .enumerate()
        .map(|(index, (_, shape))| {
            tensor_values(index, shape.iter().product())
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect()
        })
        .collect();
    let views: Vec<(&str, TensorView<'_>)> = tensors
        .iter()
        .zip(&data)
        .map(|((name, shape), bytes)| {
            (
                name.as_str(),
                TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap(),
            )
        })
        .collect();
    safetensors::serialize_to_file(views, &None, path).unwrap();
}

/// A directory laid out like the hub repository.
pub struct UpstreamRepo {
    pub dir: TempDir,
}

impl UpstreamRepo {
    pub fn new() -> Self {
        Self::with_tensors(&pytorch_shapes())
    }

    pub fn with_tensors(tensors: &[(String, Vec<usize>)]) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("moshi_lm_kwargs.json"),
            serde_json::to_string_pretty(&lm_kwargs()).unwrap(),
        )
        .unwrap();
        write_f32_checkpoint(&dir.path().join("model.safetensors"), tensors);
        std::fs::write(dir.path().join(TOKENIZER_FILENAME), b"sentencepiece").unwrap();
        std::fs::write(dir.path().join(MIMI_FILENAME), b"mimi").unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Create every file a converted model directory needs.
pub fn populate_model_dir(dir: &Path, weight_name: &str) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    let files = vec![
        dir.join(weight_name),
        dir.join("config.json"),
        dir.join(TOKENIZER_FILENAME),
        dir.join(MIMI_FILENAME),
    ];
    for file in &files {
        std::fs::write(file, b"x").unwrap();
    }
    files
}
