//! End-to-end conversion of a synthetic PyTorch checkpoint.

mod common;

use common::{UpstreamRepo, MIMI_FILENAME, PARAMETER_COUNT, QUANTIZED_COUNT, TOKENIZER_FILENAME};
use half::bf16;
use moshi_jp_core::conversion::quantize::{affine_dequantize, QuantizedTensor};
use moshi_jp_core::hub::LocalSource;
use moshi_jp_core::{ConvertRequest, Converter, MoshiError, Quantization};
use safetensors::tensor::Dtype;
use safetensors::SafeTensors;
use serde_json::Value;
use tempfile::TempDir;

async fn convert(repo: &UpstreamRepo, quantization: Quantization) -> (TempDir, moshi_jp_core::ConvertOutcome) {
    let out = TempDir::new().unwrap();
    let converter = Converter::new(LocalSource::new(repo.path()));
    let request = ConvertRequest::new(out.path().join(quantization.model_dir_name()), quantization);
    let outcome = converter.convert(&request).await.unwrap();
    (out, outcome)
}

fn bf16_values(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| bf16::from_le_bytes([b[0], b[1]]).to_f32())
        .collect()
}

#[tokio::test]
async fn test_bf16_conversion_produces_complete_directory() {
    let repo = UpstreamRepo::new();
    let (_out, outcome) = convert(&repo, Quantization::None).await;
    let layout = &outcome.layout;

    assert!(!layout.needs_conversion());
    assert_eq!(outcome.weights.parameters, PARAMETER_COUNT);
    assert_eq!(outcome.weights.quantized, 0);
    assert_eq!(outcome.weights.tensors, PARAMETER_COUNT);

    let bytes = std::fs::read(layout.weight_path()).unwrap();
    let weights = SafeTensors::deserialize(&bytes).unwrap();
    assert_eq!(weights.names().len(), PARAMETER_COUNT);
    for (_, view) in weights.tensors() {
        assert_eq!(view.dtype(), Dtype::BF16);
    }

    let norm = weights.tensor("transformer.layers.1.norm2.weight").unwrap();
    assert_eq!(norm.shape(), &[64]);

    // slice 1 holds the second half of the stacked depformer projection
    let sliced = weights
        .tensor("depformer.slices.1.transformer.layers.0.self_attn.in_proj.weight")
        .unwrap();
    assert_eq!(sliced.shape(), &[192, 64]);
    let index = common::pytorch_shapes()
        .iter()
        .position(|(name, _)| name == "depformer.layers.0.self_attn.in_proj_weight")
        .unwrap();
    let source = common::tensor_values(index, 384 * 64);
    let expected: Vec<f32> = source[192 * 64..]
        .iter()
        .map(|&v| bf16::from_f32(v).to_f32())
        .collect();
    assert_eq!(bf16_values(sliced.data()), expected);

    // step-independent norms are copied into every slice
    let a = weights
        .tensor("depformer.slices.0.transformer.layers.0.norm1.weight")
        .unwrap();
    let b = weights
        .tensor("depformer.slices.1.transformer.layers.0.norm1.weight")
        .unwrap();
    assert_eq!(a.data(), b.data());

    assert_eq!(std::fs::read(layout.tokenizer_path()).unwrap(), b"sentencepiece");
    assert_eq!(std::fs::read(layout.mimi_path()).unwrap(), b"mimi");
}

#[tokio::test]
async fn test_config_json_extends_upstream_kwargs() {
    let repo = UpstreamRepo::new();
    let (_out, outcome) = convert(&repo, Quantization::Q4).await;

    let text = std::fs::read_to_string(outcome.layout.config_path()).unwrap();
    let config: serde_json::Map<String, Value> = serde_json::from_str(&text).unwrap();
    let upstream = common::lm_kwargs();
    let upstream = upstream.as_object().unwrap();

    for (key, value) in upstream {
        assert_eq!(config.get(key), Some(value), "{key}");
    }
    assert_eq!(config.len(), upstream.len() + 3);
    assert_eq!(config["moshi_name"], "model.q4.safetensors");
    assert_eq!(config["tokenizer_name"], TOKENIZER_FILENAME);
    assert_eq!(config["mimi_name"], MIMI_FILENAME);

    let keys: Vec<&String> = config.keys().collect();
    let upstream_keys: Vec<&String> = upstream.keys().collect();
    assert_eq!(&keys[..upstream_keys.len()], upstream_keys.as_slice());
}

#[tokio::test]
async fn test_q8_conversion_layout() {
    let repo = UpstreamRepo::new();
    let (_out, outcome) = convert(&repo, Quantization::Q8).await;
    assert_eq!(outcome.weights.quantized, QUANTIZED_COUNT);
    assert_eq!(outcome.weights.tensors, PARAMETER_COUNT + 2 * QUANTIZED_COUNT);
    assert_eq!(
        outcome.layout.weight_path().file_name().unwrap(),
        "model.q8.safetensors"
    );

    let bytes = std::fs::read(outcome.layout.weight_path()).unwrap();
    let weights = SafeTensors::deserialize(&bytes).unwrap();

    let packed = weights.tensor("transformer.layers.0.self_attn.in_proj.weight").unwrap();
    assert_eq!(packed.dtype(), Dtype::U32);
    assert_eq!(packed.shape(), &[192, 16]);
    let scales = weights.tensor("transformer.layers.0.self_attn.in_proj.scales").unwrap();
    assert_eq!(scales.shape(), &[192, 1]);

    let packed = weights.tensor("transformer.layers.0.gating.linear_out.weight").unwrap();
    assert_eq!(packed.dtype(), Dtype::U32);
    assert_eq!(packed.shape(), &[64, 48]);
    let scales = weights
        .tensor("depformer.slices.1.transformer.layers.0.gating.linear_out.scales")
        .unwrap();
    assert_eq!(scales.shape(), &[64, 2]);

    let norm = weights.tensor("out_norm.weight").unwrap();
    assert_eq!(norm.dtype(), Dtype::BF16);
    assert!(weights.tensor("out_norm.scales").is_err());
}

#[tokio::test]
async fn test_q4_dequantizes_close_to_source() {
    let repo = UpstreamRepo::new();
    let (_out, outcome) = convert(&repo, Quantization::Q4).await;
    assert_eq!(outcome.weights.quantized, QUANTIZED_COUNT);
    assert_eq!(outcome.weights.tensors, PARAMETER_COUNT + 2 * QUANTIZED_COUNT);

    let bytes = std::fs::read(outcome.layout.weight_path()).unwrap();
    let weights = SafeTensors::deserialize(&bytes).unwrap();

    let weight = weights.tensor("text_linear.weight").unwrap();
    assert_eq!(weight.shape(), &[31, 8]);
    let quantized = QuantizedTensor {
        weight: weight
            .data()
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        scales: bf16_values(weights.tensor("text_linear.scales").unwrap().data())
            .into_iter()
            .map(bf16::from_f32)
            .collect(),
        biases: bf16_values(weights.tensor("text_linear.biases").unwrap().data())
            .into_iter()
            .map(bf16::from_f32)
            .collect(),
    };
    let spec = Quantization::Q4.spec().unwrap();
    let restored = affine_dequantize(&quantized, spec);

    let index = common::pytorch_shapes()
        .iter()
        .position(|(name, _)| name == "text_linear.weight")
        .unwrap();
    let source = common::tensor_values(index, 31 * 64);
    assert_eq!(restored.len(), source.len());
    for (i, (&orig, &back)) in source.iter().zip(&restored).enumerate() {
        let step = quantized.scales[i / spec.group_size].to_f32().abs();
        assert!(
            (orig - back).abs() <= step * 1.2 + 1e-3,
            "{i}: {orig} vs {back}"
        );
    }
}

#[tokio::test]
async fn test_strict_load_rejects_incomplete_checkpoint() {
    let mut tensors = common::pytorch_shapes();
    tensors.retain(|(name, _)| name != "out_norm.alpha");
    tensors.push(("lm_head.bias".to_string(), vec![31]));
    if let Some((_, shape)) = tensors.iter_mut().find(|(name, _)| name == "text_linear.weight") {
        *shape = vec![32, 64];
    }
    let repo = UpstreamRepo::with_tensors(&tensors);

    let out = TempDir::new().unwrap();
    let converter = Converter::new(LocalSource::new(repo.path()));
    let request = ConvertRequest::new(out.path().join("model"), Quantization::Q8);

    match converter.convert(&request).await {
        Err(MoshiError::WeightMismatch(mismatch)) => {
            assert_eq!(mismatch.missing, vec!["out_norm.weight".to_string()]);
            assert_eq!(mismatch.unexpected, vec!["lm_head.bias".to_string()]);
            assert_eq!(
                mismatch.shape_mismatches,
                vec![("text_linear.weight".to_string(), vec![31, 64], vec![32, 64])]
            );
        }
        other => panic!("expected a weight mismatch, got {other:?}"),
    }
    assert!(!out.path().join("model/model.q8.safetensors").exists());
    assert!(!out.path().join("model/config.json").exists());
}

#[tokio::test]
async fn test_missing_upstream_file_fails() {
    let repo = UpstreamRepo::new();
    std::fs::remove_file(repo.path().join(MIMI_FILENAME)).unwrap();

    let out = TempDir::new().unwrap();
    let converter = Converter::new(LocalSource::new(repo.path()));
    let request = ConvertRequest::new(out.path().join("model"), Quantization::None);
    assert!(matches!(
        converter.convert(&request).await,
        Err(MoshiError::FileNotFound(_))
    ));
}
