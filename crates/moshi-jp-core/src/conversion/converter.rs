//! End-to-end conversion of the hub checkpoint into an MLX model directory.

use super::lm_config::LmConfig;
use super::model_config;
use super::writer::{convert_checkpoint, WeightStats};
use crate::config::{HubConfig, LayoutConfig};
use crate::error::{IoResultExt, Result};
use crate::hub::ArtifactSource;
use crate::models::{ModelLayout, Quantization};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// What to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertRequest {
    pub output_dir: PathBuf,
    pub quantization: Quantization,
}

impl ConvertRequest {
    pub fn new(output_dir: impl Into<PathBuf>, quantization: Quantization) -> Self {
        Self {
            output_dir: output_dir.into(),
            quantization,
        }
    }
}

/// Result of a finished conversion.
#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    pub layout: ModelLayout,
    pub weights: WeightStats,
}

/// Fetches upstream artifacts and writes a complete MLX model directory.
pub struct Converter<S> {
    source: S,
}

impl<S: ArtifactSource> Converter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Run all five steps. Any failure aborts the run; files already written
    /// to the output directory are left in place.
    pub async fn convert(&self, request: &ConvertRequest) -> Result<ConvertOutcome> {
        let layout = ModelLayout::new(&request.output_dir, request.quantization);
        tokio::fs::create_dir_all(layout.dir())
            .await
            .with_path(layout.dir())?;

        info!(
            "[1/5] Downloading model config: {} from {}",
            HubConfig::LM_CONFIG_FILENAME,
            self.source.describe()
        );
        let lm_config_path = self.source.fetch(HubConfig::LM_CONFIG_FILENAME).await?;
        let upstream = model_config::read_upstream_config(&lm_config_path)?;
        let lm_config = LmConfig::from_json(&Value::Object(upstream.clone()))?;
        info!(
            "  dim={}, layers={}, n_q={}, dep_q={}",
            lm_config.dim, lm_config.num_layers, lm_config.n_q, lm_config.dep_q
        );

        info!(
            "[2/5] Downloading model weights: {} (skipped when cached)",
            HubConfig::SOURCE_WEIGHTS_FILENAME
        );
        let weights_path = self.source.fetch(HubConfig::SOURCE_WEIGHTS_FILENAME).await?;

        info!("[3/5] Downloading tokenizer files");
        let tokenizer_path = self.source.fetch(LayoutConfig::TOKENIZER_FILENAME).await?;
        let mimi_path = self.source.fetch(LayoutConfig::MIMI_FILENAME).await?;

        info!("[4/5] Mapping weights to the MLX layout");
        let weights = convert_checkpoint(
            &weights_path,
            &lm_config,
            request.quantization,
            &layout.weight_path(),
        )?;

        let config = model_config::mlx_config(&upstream, request.quantization.weight_filename());
        model_config::write_config(&layout.config_path(), &config)?;
        copy_artifact(&tokenizer_path, &layout.tokenizer_path()).await?;
        copy_artifact(&mimi_path, &layout.mimi_path()).await?;

        info!("Conversion complete! Model saved to {}", layout.dir().display());
        Ok(ConvertOutcome { layout, weights })
    }
}

/// Copy file contents, following the cache symlink to its blob.
async fn copy_artifact(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::copy(from, to).await.with_path(to)?;
    Ok(())
}
