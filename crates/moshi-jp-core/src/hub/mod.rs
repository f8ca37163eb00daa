//! Artifact retrieval from the HuggingFace hub.
//!
//! Files are cached in the same layout `huggingface_hub` uses, so a cache
//! populated by Python tooling is reused as is and vice versa:
//!
//! ```text
//! <hub cache>/models--<org>--<name>/
//!     blobs/<etag>
//!     refs/<revision>            -> commit hash
//!     snapshots/<commit>/<file>  -> ../../blobs/<etag>
//! ```
//!
//! Blobs are keyed by content (the etag), so fetching an unchanged file twice
//! downloads it once.

mod auth;
mod cache;
mod client;
mod progress;

pub use auth::resolve_token;
pub use cache::HubCache;
pub use client::HubClient;
pub use progress::DownloadProgress;

use crate::config::HubConfig;
use crate::error::{MoshiError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Something the converter can fetch named artifacts from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Return a local path holding `filename`, fetching it first if needed.
    async fn fetch(&self, filename: &str) -> Result<PathBuf>;

    /// Human-readable origin, used in log lines.
    fn describe(&self) -> String;
}

/// Artifacts already present in a plain local directory.
#[derive(Debug, Clone)]
pub struct LocalSource {
    dir: PathBuf,
}

impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSource for LocalSource {
    async fn fetch(&self, filename: &str) -> Result<PathBuf> {
        let path = self.dir.join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(MoshiError::FileNotFound(path))
        }
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Hub endpoint, cache location, and credentials.
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub endpoint: String,
    pub cache_dir: PathBuf,
    pub token: Option<String>,
    pub revision: String,
    /// Never contact the hub; serve only cached snapshots.
    pub offline: bool,
}

impl HubSettings {
    /// Resolve settings from the standard `HF_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let hf_home = hf_home()?;
        let cache_dir = std::env::var_os(HubConfig::HUB_CACHE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| hf_home.join("hub"));
        let endpoint = std::env::var(HubConfig::ENDPOINT_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| HubConfig::DEFAULT_ENDPOINT.to_string());
        let offline = std::env::var(HubConfig::OFFLINE_ENV)
            .map(|value| is_truthy(&value))
            .unwrap_or(false);

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            cache_dir,
            token: resolve_token(&hf_home),
            revision: HubConfig::DEFAULT_REVISION.to_string(),
            offline,
        })
    }

    /// Settings rooted at an explicit cache directory, with no token.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: HubConfig::DEFAULT_ENDPOINT.to_string(),
            cache_dir: cache_dir.into(),
            token: None,
            revision: HubConfig::DEFAULT_REVISION.to_string(),
            offline: false,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }
}

fn hf_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HubConfig::HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    if let Some(xdg) = std::env::var_os("XDG_CACHE_HOME") {
        return Ok(Path::new(&xdg).join("huggingface"));
    }
    let home = dirs::home_dir().ok_or_else(|| MoshiError::config("Could not determine home directory"))?;
    Ok(home.join(".cache").join("huggingface"))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_source_fetch() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.json"), "{}").unwrap();
        let source = LocalSource::new(temp.path());

        assert_eq!(source.fetch("a.json").await.unwrap(), temp.path().join("a.json"));
        assert!(matches!(
            source.fetch("missing.bin").await,
            Err(MoshiError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn test_settings_builders() {
        let settings = HubSettings::with_cache_dir("/cache")
            .with_revision("abc")
            .with_offline(true);
        assert_eq!(settings.cache_dir, PathBuf::from("/cache"));
        assert_eq!(settings.revision, "abc");
        assert!(settings.offline);
        assert!(settings.token.is_none());
    }
}
