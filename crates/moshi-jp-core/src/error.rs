//! Error types for moshi-jp.
//!
//! Every failure is fatal to the running command: nothing here is retried or
//! recovered, the variants only exist to give the operator a precise message.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for the moshi-jp library.
#[derive(Debug, Error)]
pub enum MoshiError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("{repo_id}/{filename} is not in the local cache and the hub is unreachable")]
    NotCached { repo_id: String, filename: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Safetensors error: {message}")]
    Safetensors { message: String },

    // Conversion errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported dtype {dtype} for tensor {tensor}")]
    UnsupportedDtype { tensor: String, dtype: String },

    #[error("Strict weight load failed: {0}")]
    WeightMismatch(WeightMismatch),

    #[error("Cannot quantize {tensor}: {message}")]
    Quantization { tensor: String, message: String },

    // Process errors
    #[error("Failed to start {program}: {message}")]
    LaunchFailed { program: String, message: String },

    #[error("{program} exited with status {code}")]
    ProcessFailed { program: String, code: i32 },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },
}

/// Result type alias for moshi-jp operations.
pub type Result<T> = std::result::Result<T, MoshiError>;

/// Every difference between a checkpoint and the parameters the model expects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightMismatch {
    /// Expected parameters that no checkpoint tensor maps to.
    pub missing: Vec<String>,
    /// Checkpoint tensors that map to no expected parameter.
    pub unexpected: Vec<String>,
    /// `(parameter, expected shape, found shape)` triples.
    pub shape_mismatches: Vec<(String, Vec<usize>, Vec<usize>)>,
}

impl WeightMismatch {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.shape_mismatches.is_empty()
    }
}

impl fmt::Display for WeightMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing [{}]", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected [{}]", self.unexpected.join(", ")));
        }
        if !self.shape_mismatches.is_empty() {
            let shapes: Vec<String> = self
                .shape_mismatches
                .iter()
                .map(|(name, expected, found)| format!("{name}: expected {expected:?}, found {found:?}"))
                .collect();
            parts.push(format!("shape mismatch [{}]", shapes.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}

// Conversion implementations for common error types

impl From<std::io::Error> for MoshiError {
    fn from(err: std::io::Error) -> Self {
        MoshiError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MoshiError {
    fn from(err: serde_json::Error) -> Self {
        MoshiError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for MoshiError {
    fn from(err: reqwest::Error) -> Self {
        MoshiError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<safetensors::SafeTensorError> for MoshiError {
    fn from(err: safetensors::SafeTensorError) -> Self {
        MoshiError::Safetensors {
            message: err.to_string(),
        }
    }
}

impl MoshiError {
    /// Create an IO error with a short description of what was being done.
    pub fn io(context: &str, path: impl AsRef<Path>, err: std::io::Error) -> Self {
        MoshiError::Io {
            message: format!("{context}: {err}"),
            path: Some(path.as_ref().to_path_buf()),
            source: Some(err),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        MoshiError::Config {
            message: message.into(),
        }
    }
}

/// Attach a path to `std::io::Error` results.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|err| MoshiError::Io {
            message: err.to_string(),
            path: Some(path.as_ref().to_path_buf()),
            source: Some(err),
        })
    }
}
