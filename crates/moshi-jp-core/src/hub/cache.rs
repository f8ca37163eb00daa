//! `huggingface_hub`-compatible file cache.

use crate::config::NetworkConfig;
use crate::error::{IoResultExt, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cache directory of one model repository.
#[derive(Debug, Clone)]
pub struct HubCache {
    repo_dir: PathBuf,
}

impl HubCache {
    pub fn new(cache_dir: &Path, repo_id: &str) -> Self {
        let folder = format!("models--{}", repo_id.replace('/', "--"));
        Self {
            repo_dir: cache_dir.join(folder),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn blob_path(&self, etag: &str) -> PathBuf {
        self.repo_dir.join("blobs").join(etag)
    }

    pub fn incomplete_blob_path(&self, etag: &str) -> PathBuf {
        self.repo_dir
            .join("blobs")
            .join(format!("{etag}{}", NetworkConfig::INCOMPLETE_SUFFIX))
    }

    pub fn snapshot_path(&self, commit: &str, filename: &str) -> PathBuf {
        let mut path = self.repo_dir.join("snapshots").join(commit);
        for segment in filename.split('/') {
            path.push(segment);
        }
        path
    }

    fn ref_path(&self, revision: &str) -> PathBuf {
        self.repo_dir.join("refs").join(revision)
    }

    /// Commit hash a revision pointed to when it was last resolved.
    pub fn read_ref(&self, revision: &str) -> Option<String> {
        if is_commit_hash(revision) {
            return Some(revision.to_string());
        }
        let commit = std::fs::read_to_string(self.ref_path(revision)).ok()?;
        let commit = commit.trim();
        (!commit.is_empty()).then(|| commit.to_string())
    }

    /// Record `revision -> commit`; commit hashes need no ref file.
    pub fn write_ref(&self, revision: &str, commit: &str) -> Result<()> {
        if revision == commit || is_commit_hash(revision) {
            return Ok(());
        }
        if self.read_ref(revision).as_deref() == Some(commit) {
            return Ok(());
        }
        let path = self.ref_path(revision);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        std::fs::write(&path, commit).with_path(&path)
    }

    /// Snapshot file for `revision` if it was cached earlier.
    pub fn cached_snapshot(&self, revision: &str, filename: &str) -> Option<PathBuf> {
        let commit = self.read_ref(revision)?;
        let path = self.snapshot_path(&commit, filename);
        path.exists().then_some(path)
    }

    /// Point `snapshots/<commit>/<filename>` at the blob for `etag`.
    pub fn link_snapshot(&self, commit: &str, filename: &str, etag: &str) -> Result<PathBuf> {
        let snapshot = self.snapshot_path(commit, filename);
        if let Some(parent) = snapshot.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        if snapshot.symlink_metadata().is_ok() {
            std::fs::remove_file(&snapshot).with_path(&snapshot)?;
        }

        #[cfg(unix)]
        {
            // snapshots/<commit>/<a>/<b> -> ../../../blobs/<etag>
            let depth = filename.split('/').count() + 1;
            let mut target = PathBuf::new();
            for _ in 0..depth {
                target.push("..");
            }
            target.push("blobs");
            target.push(etag);
            std::os::unix::fs::symlink(&target, &snapshot).with_path(&snapshot)?;
        }

        #[cfg(not(unix))]
        {
            let blob = self.blob_path(etag);
            std::fs::copy(&blob, &snapshot).with_path(&snapshot)?;
        }

        debug!("Linked {} -> blob {}", snapshot.display(), etag);
        Ok(snapshot)
    }
}

/// Full 40-character git commit hash.
fn is_commit_hash(revision: &str) -> bool {
    revision.len() == 40 && revision.chars().all(|c| c.is_ascii_hexdigit())
}

/// Strip weak-validator prefix and quotes from an ETag header value.
pub(crate) fn normalize_etag(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("W/")
        .trim_matches('"')
        .to_string()
}

/// True when an etag is a sha256 digest (LFS files), which can be verified.
pub(crate) fn is_sha256_etag(etag: &str) -> bool {
    etag.len() == 64 && etag.chars().all(|c| c.is_ascii_hexdigit())
}
