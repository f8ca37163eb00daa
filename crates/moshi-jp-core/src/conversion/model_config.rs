//! The `config.json` written next to converted weights.

use crate::config::LayoutConfig;
use crate::error::{IoResultExt, MoshiError, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Read the upstream LM kwargs file; it must hold a JSON object.
pub fn read_upstream_config(path: &Path) -> Result<Map<String, Value>> {
    let text = std::fs::read_to_string(path).with_path(path)?;
    match serde_json::from_str(&text)? {
        Value::Object(map) => Ok(map),
        other => Err(MoshiError::config(format!(
            "{} must contain a JSON object, found {}",
            path.display(),
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Upstream keys in their original order, plus the three file names the
/// server loads.
pub fn mlx_config(upstream: &Map<String, Value>, weight_filename: &str) -> Map<String, Value> {
    let mut config = upstream.clone();
    config.insert("moshi_name".into(), Value::from(weight_filename));
    config.insert("tokenizer_name".into(), Value::from(LayoutConfig::TOKENIZER_FILENAME));
    config.insert("mimi_name".into(), Value::from(LayoutConfig::MIMI_FILENAME));
    config
}

pub fn write_config(path: &Path, config: &Map<String, Value>) -> Result<()> {
    let text = serde_json::to_string_pretty(config)?;
    std::fs::write(path, text).with_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_mlx_config_keeps_order_and_adds_names() {
        let upstream = json!({"dim": 64, "text_card": 31, "delays": [0, 1]});
        let Value::Object(upstream) = upstream else {
            unreachable!()
        };

        let config = mlx_config(&upstream, "model.q8.safetensors");
        let keys: Vec<&str> = config.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["dim", "text_card", "delays", "moshi_name", "tokenizer_name", "mimi_name"]
        );
        assert_eq!(config["moshi_name"], "model.q8.safetensors");
        assert_eq!(config["delays"], json!([0, 1]));
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        let config = mlx_config(&Map::new(), "model.safetensors");
        write_config(&path, &config).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"moshi_name\""));
        assert_eq!(read_upstream_config(&path).unwrap(), config);
    }

    #[test]
    fn test_non_object_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kwargs.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            read_upstream_config(&path),
            Err(MoshiError::Config { .. })
        ));
    }
}
