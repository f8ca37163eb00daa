//! On-disk layout of a converted model directory.

use super::Quantization;
use crate::config::LayoutConfig;
use std::path::{Path, PathBuf};

/// The four files a converted model directory must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLayout {
    dir: PathBuf,
    quantization: Quantization,
}

impl ModelLayout {
    pub fn new(dir: impl Into<PathBuf>, quantization: Quantization) -> Self {
        Self {
            dir: dir.into(),
            quantization,
        }
    }

    /// Canonical directory for `quantization` under a models root.
    pub fn in_models_root(models_root: &Path, quantization: Quantization) -> Self {
        Self::new(models_root.join(quantization.model_dir_name()), quantization)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn quantization(&self) -> Quantization {
        self.quantization
    }

    pub fn weight_path(&self) -> PathBuf {
        self.dir.join(self.quantization.weight_filename())
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(LayoutConfig::CONFIG_FILENAME)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.dir.join(LayoutConfig::TOKENIZER_FILENAME)
    }

    pub fn mimi_path(&self) -> PathBuf {
        self.dir.join(LayoutConfig::MIMI_FILENAME)
    }

    pub fn required_files(&self) -> [PathBuf; 4] {
        required_files(&self.dir, self.quantization.weight_filename())
    }

    /// Required files that do not exist yet.
    pub fn missing_files(&self) -> Vec<PathBuf> {
        self.required_files()
            .into_iter()
            .filter(|path| !path.exists())
            .collect()
    }

    pub fn needs_conversion(&self) -> bool {
        needs_conversion(&self.dir, self.quantization.weight_filename())
    }
}

fn required_files(model_dir: &Path, weight_name: &str) -> [PathBuf; 4] {
    [
        model_dir.join(weight_name),
        model_dir.join(LayoutConfig::CONFIG_FILENAME),
        model_dir.join(LayoutConfig::TOKENIZER_FILENAME),
        model_dir.join(LayoutConfig::MIMI_FILENAME),
    ]
}

/// True when at least one of the four required files is absent.
///
/// Only presence is checked: a stale or truncated file with the right name
/// is accepted.
pub fn needs_conversion(model_dir: &Path, weight_name: &str) -> bool {
    !required_files(model_dir, weight_name)
        .iter()
        .all(|path| path.exists())
}
