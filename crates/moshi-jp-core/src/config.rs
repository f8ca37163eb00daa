//! Centralized configuration for moshi-jp.
//!
//! Fixed repository coordinates, file names, quantization policy, and
//! network/server defaults. Nothing here is read from disk.

use std::time::Duration;

/// HuggingFace hub coordinates and environment variable names.
pub struct HubConfig;

impl HubConfig {
    pub const REPO_ID: &'static str = "llm-jp/llm-jp-moshi-v1";
    pub const DEFAULT_REVISION: &'static str = "main";
    pub const DEFAULT_ENDPOINT: &'static str = "https://huggingface.co";
    pub const LM_CONFIG_FILENAME: &'static str = "moshi_lm_kwargs.json";
    pub const SOURCE_WEIGHTS_FILENAME: &'static str = "model.safetensors";

    pub const ENDPOINT_ENV: &'static str = "HF_ENDPOINT";
    pub const HOME_ENV: &'static str = "HF_HOME";
    pub const HUB_CACHE_ENV: &'static str = "HF_HUB_CACHE";
    pub const OFFLINE_ENV: &'static str = "HF_HUB_OFFLINE";
    pub const TOKEN_ENV: &'static str = "HF_TOKEN";
    pub const TOKEN_PATH_ENV: &'static str = "HF_TOKEN_PATH";
}

/// Converted model directory layout.
pub struct LayoutConfig;

impl LayoutConfig {
    pub const CONFIG_FILENAME: &'static str = "config.json";
    pub const TOKENIZER_FILENAME: &'static str = "tokenizer_spm_32k_3.model";
    pub const MIMI_FILENAME: &'static str = "tokenizer-e351c8d8-checkpoint125.safetensors";
    pub const MODELS_DIR_NAME: &'static str = "models";
    /// Per-user data directory name holding the default models root.
    pub const APP_DIR_NAME: &'static str = "moshi-jp";
}

/// Quantization policy. Group sizes are fixed per bit width.
pub struct QuantConfig;

impl QuantConfig {
    pub const Q8_GROUP_SIZE: usize = 64;
    pub const Q4_GROUP_SIZE: usize = 32;
    pub const SCALE_EPSILON: f32 = 1e-7;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const METADATA_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = concat!("moshi-jp/", env!("CARGO_PKG_VERSION"));
    pub const INCOMPLETE_SUFFIX: &'static str = ".incomplete";
    pub const DOWNLOAD_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);
}

/// Local web server and launcher defaults.
pub struct ServerConfig;

impl ServerConfig {
    pub const MODULE: &'static str = "moshi_mlx.local_web";
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 8998;
    pub const DEFAULT_PYTHON: &'static str = "python3";
    pub const CONVERTER_BIN_NAME: &'static str = "moshi-jp-convert";

    pub const PYTHON_ENV: &'static str = "MOSHI_JP_PYTHON";
    pub const MODELS_DIR_ENV: &'static str = "MOSHI_JP_MODELS_DIR";
    pub const CONVERTER_ENV: &'static str = "MOSHI_JP_CONVERTER";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_sizes_fit_packing() {
        // A group must fill whole u32 words at its bit width.
        assert_eq!(QuantConfig::Q8_GROUP_SIZE % (32 / 8), 0);
        assert_eq!(QuantConfig::Q4_GROUP_SIZE % (32 / 4), 0);
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(NetworkConfig::METADATA_TIMEOUT > Duration::ZERO);
        assert!(NetworkConfig::CONNECT_TIMEOUT >= NetworkConfig::METADATA_TIMEOUT);
    }
}
