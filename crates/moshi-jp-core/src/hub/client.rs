//! Cache-aware HuggingFace file downloads.

use super::cache::{is_sha256_etag, normalize_etag, HubCache};
use super::progress::{DownloadProgress, SpeedTracker};
use super::{ArtifactSource, HubSettings};
use crate::config::NetworkConfig;
use crate::error::{IoResultExt, MoshiError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT_ENCODING, CONTENT_LENGTH, ETAG};
use reqwest::{redirect, Client};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const REPO_COMMIT_HEADER: &str = "x-repo-commit";
const LINKED_ETAG_HEADER: &str = "x-linked-etag";
const LINKED_SIZE_HEADER: &str = "x-linked-size";

/// What the hub reports about a file at a revision.
#[derive(Debug, Clone)]
struct FileMetadata {
    commit: String,
    etag: String,
    size: Option<u64>,
}

/// Downloads files of one hub repository into the shared cache.
pub struct HubClient {
    repo_id: String,
    settings: HubSettings,
    cache: HubCache,
    /// Follows redirects to the CDN for file bodies.
    http: Client,
    /// Does not follow redirects, so LFS metadata headers stay visible.
    metadata_http: Client,
}

impl HubClient {
    pub fn new(repo_id: impl Into<String>, settings: HubSettings) -> Result<Self> {
        let repo_id = repo_id.into();
        let http = Client::builder()
            .user_agent(NetworkConfig::USER_AGENT)
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .build()
            .map_err(|e| MoshiError::Network {
                message: format!("Failed to create HTTP client: {e}"),
                source: Some(e),
            })?;
        let metadata_http = Client::builder()
            .user_agent(NetworkConfig::USER_AGENT)
            .timeout(NetworkConfig::METADATA_TIMEOUT)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| MoshiError::Network {
                message: format!("Failed to create HTTP client: {e}"),
                source: Some(e),
            })?;

        Ok(Self {
            cache: HubCache::new(&settings.cache_dir, &repo_id),
            repo_id,
            settings,
            http,
            metadata_http,
        })
    }

    /// `<endpoint>/<repo>/resolve/<revision>/<file>` with each segment escaped.
    pub fn resolve_url(&self, filename: &str) -> String {
        let file: Vec<String> = filename
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "{}/{}/resolve/{}/{}",
            self.settings.endpoint,
            self.repo_id,
            urlencoding::encode(&self.settings.revision),
            file.join("/")
        )
    }

    /// Return the cached snapshot path of `filename`, downloading the blob
    /// only when no blob with the current etag exists.
    pub async fn download(&self, filename: &str) -> Result<PathBuf> {
        let revision = &self.settings.revision;

        if self.settings.offline {
            return self
                .cache
                .cached_snapshot(revision, filename)
                .ok_or_else(|| self.not_cached(filename));
        }

        let metadata = match self.fetch_metadata(filename).await {
            Ok(metadata) => metadata,
            Err(err @ MoshiError::Network { .. }) => {
                return match self.cache.cached_snapshot(revision, filename) {
                    Some(path) => {
                        warn!("Hub unreachable ({}), using cached {}", err, path.display());
                        Ok(path)
                    }
                    None => Err(err),
                };
            }
            Err(err) => return Err(err),
        };

        let blob = self.cache.blob_path(&metadata.etag);
        if blob.exists() {
            debug!("{} already cached as blob {}", filename, metadata.etag);
        } else {
            self.download_blob(filename, &metadata).await?;
        }

        self.cache.write_ref(revision, &metadata.commit)?;
        let snapshot = self.cache.snapshot_path(&metadata.commit, filename);
        if snapshot.exists() {
            return Ok(snapshot);
        }
        self.cache
            .link_snapshot(&metadata.commit, filename, &metadata.etag)
    }

    fn not_cached(&self, filename: &str) -> MoshiError {
        MoshiError::NotCached {
            repo_id: self.repo_id.clone(),
            filename: filename.to_string(),
        }
    }

    async fn fetch_metadata(&self, filename: &str) -> Result<FileMetadata> {
        let url = self.resolve_url(filename);
        let mut request = self
            .metadata_http
            .head(&url)
            .header(ACCEPT_ENCODING, "identity");
        if let Some(token) = &self.settings.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| MoshiError::Network {
            message: format!("HEAD {url} failed: {e}"),
            source: Some(e),
        })?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(MoshiError::DownloadFailed {
                url,
                message: format!("metadata request returned {status}"),
            });
        }

        parse_metadata(response.headers()).ok_or_else(|| MoshiError::DownloadFailed {
            url,
            message: "response is missing commit or etag headers".to_string(),
        })
    }

    async fn download_blob(&self, filename: &str, metadata: &FileMetadata) -> Result<()> {
        let url = self.resolve_url(filename);
        let incomplete = self.cache.incomplete_blob_path(&metadata.etag);
        let blob = self.cache.blob_path(&metadata.etag);
        if let Some(parent) = blob.parent() {
            tokio::fs::create_dir_all(parent).await.with_path(parent)?;
        }

        let mut request = self.http.get(&url);
        if let Some(token) = &self.settings.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| MoshiError::Network {
            message: format!("GET {url} failed: {e}"),
            source: Some(e),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MoshiError::DownloadFailed {
                url,
                message: format!("Download failed with status {status}"),
            });
        }

        let total_bytes = response.content_length().or(metadata.size);
        info!("Downloading {} from {}", filename, self.repo_id);

        let mut file = tokio::fs::File::create(&incomplete)
            .await
            .with_path(&incomplete)?;
        let verify = is_sha256_etag(&metadata.etag);
        let mut hasher = Sha256::new();
        let mut bytes_downloaded: u64 = 0;
        let mut tracker = SpeedTracker::new(NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MoshiError::Network {
                message: format!("Error reading download stream: {e}"),
                source: Some(e),
            })?;
            file.write_all(&chunk).await.with_path(&incomplete)?;
            if verify {
                hasher.update(&chunk);
            }

            bytes_downloaded += chunk.len() as u64;
            tracker.record(chunk.len() as u64);
            if tracker.report_due() {
                let progress = DownloadProgress::new(bytes_downloaded, total_bytes, tracker.speed());
                info!("{}: {}", filename, progress.summary());
            }
        }

        file.flush().await.with_path(&incomplete)?;
        file.sync_all().await.with_path(&incomplete)?;
        drop(file);

        if verify {
            let actual = hex::encode(hasher.finalize());
            if actual != metadata.etag {
                let _ = tokio::fs::remove_file(&incomplete).await;
                return Err(MoshiError::HashMismatch {
                    expected: metadata.etag.clone(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&incomplete, &blob).await.with_path(&blob)?;
        info!("Downloaded {} ({} bytes)", filename, bytes_downloaded);
        Ok(())
    }
}

#[async_trait]
impl ArtifactSource for HubClient {
    async fn fetch(&self, filename: &str) -> Result<PathBuf> {
        self.download(filename).await
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.repo_id, self.settings.revision)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// LFS files carry their identity in `X-Linked-*` headers on the redirect;
/// regular files use the plain `ETag` and `Content-Length`.
fn parse_metadata(headers: &HeaderMap) -> Option<FileMetadata> {
    let commit = header_str(headers, REPO_COMMIT_HEADER)?.trim().to_string();
    let etag = header_str(headers, LINKED_ETAG_HEADER)
        .or_else(|| header_str(headers, ETAG.as_str()))
        .map(normalize_etag)
        .filter(|etag| !etag.is_empty())?;
    let size = header_str(headers, LINKED_SIZE_HEADER)
        .or_else(|| header_str(headers, CONTENT_LENGTH.as_str()))
        .and_then(|value| value.trim().parse().ok());

    (!commit.is_empty()).then_some(FileMetadata { commit, etag, size })
}
