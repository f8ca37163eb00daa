//! HuggingFace token resolution.

use crate::config::HubConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve an HF token for authenticated downloads.
///
/// Checks in order:
/// 1. `HF_TOKEN` environment variable
/// 2. `HF_TOKEN_PATH`, or the CLI token file `<HF_HOME>/token`
pub fn resolve_token(hf_home: &Path) -> Option<String> {
    if let Ok(token) = std::env::var(HubConfig::TOKEN_ENV) {
        if let Some(token) = non_empty(&token) {
            debug!("Using HF token from {}", HubConfig::TOKEN_ENV);
            return Some(token);
        }
    }

    let token_path = std::env::var_os(HubConfig::TOKEN_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| hf_home.join("token"));
    read_token_file(&token_path)
}

fn read_token_file(path: &Path) -> Option<String> {
    let token = std::fs::read_to_string(path).ok()?;
    let token = non_empty(&token)?;
    debug!("Using HF token from {}", path.display());
    Some(token)
}

fn non_empty(token: &str) -> Option<String> {
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
