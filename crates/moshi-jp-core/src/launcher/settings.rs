//! Where the launcher finds models and programs.

use crate::config::{LayoutConfig, ServerConfig};
use crate::error::{MoshiError, Result};
use std::path::{Path, PathBuf};

/// Resolved models root, Python interpreter, and converter program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherSettings {
    pub models_root: PathBuf,
    pub python: String,
    pub converter: String,
}

impl LauncherSettings {
    /// Resolve from explicit overrides, then `MOSHI_JP_*` variables, then
    /// defaults.
    pub fn resolve(models_dir: Option<PathBuf>, python: Option<String>) -> Result<Self> {
        let models_root = models_dir.or_else(|| env_value(ServerConfig::MODELS_DIR_ENV).map(PathBuf::from));
        let models_root = match models_root {
            Some(root) => root,
            None => default_models_root()?,
        };
        let python = python
            .or_else(|| env_value(ServerConfig::PYTHON_ENV))
            .unwrap_or_else(|| ServerConfig::DEFAULT_PYTHON.to_string());
        let converter = match env_value(ServerConfig::CONVERTER_ENV) {
            Some(converter) => converter,
            None => sibling_converter()?,
        };

        Ok(Self {
            models_root,
            python,
            converter,
        })
    }

    /// Fixed settings, independent of the environment.
    pub fn new(models_root: impl Into<PathBuf>, python: impl Into<String>, converter: impl Into<String>) -> Self {
        Self {
            models_root: models_root.into(),
            python: python.into(),
            converter: converter.into(),
        }
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// `<data dir>/moshi-jp/models`, or `models` beside the executable on
/// platforms without a per-user data directory. Never relative to the
/// working directory.
fn default_models_root() -> Result<PathBuf> {
    match dirs::data_dir() {
        Some(data) => Ok(data.join(LayoutConfig::APP_DIR_NAME).join(LayoutConfig::MODELS_DIR_NAME)),
        None => Ok(exe_dir("models_dir")?.join(LayoutConfig::MODELS_DIR_NAME)),
    }
}

/// Directory of the running executable.
fn exe_dir(field: &str) -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| MoshiError::Io {
        message: format!("locating current executable: {e}"),
        path: None,
        source: Some(e),
    })?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| MoshiError::Validation {
            field: field.to_string(),
            message: format!("{} has no parent directory", exe.display()),
        })
}

/// The converter binary installed next to the running executable.
fn sibling_converter() -> Result<String> {
    let name = format!("{}{}", ServerConfig::CONVERTER_BIN_NAME, std::env::consts::EXE_SUFFIX);
    Ok(exe_dir("converter")?.join(name).display().to_string())
}
