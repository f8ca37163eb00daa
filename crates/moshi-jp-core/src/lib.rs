//! moshi-jp core - Convert and serve LLM-jp-Moshi-v1 with MLX.
//!
//! This crate fetches the `llm-jp/llm-jp-moshi-v1` PyTorch checkpoint from the
//! HuggingFace hub, rewrites it into the parameter layout `moshi_mlx` loads
//! (optionally 4- or 8-bit quantized), and launches the `moshi_mlx.local_web`
//! server against the converted directory.
//!
//! The two command-line tools live in the `moshi-jp-cli` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use moshi_jp_core::{ConvertRequest, Converter, HubClient, HubSettings, Quantization};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> moshi_jp_core::Result<()> {
//!     let client = HubClient::new("llm-jp/llm-jp-moshi-v1", HubSettings::from_env()?)?;
//!     let converter = Converter::new(client);
//!
//!     let request = ConvertRequest::new("models/llm-jp-moshi-mlx-q8", Quantization::Q8);
//!     let outcome = converter.convert(&request).await?;
//!     println!("{} tensors written", outcome.weights.tensors);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conversion;
pub mod error;
pub mod hub;
pub mod launcher;
pub mod models;

// Re-export commonly used types
pub use conversion::{ConvertOutcome, ConvertRequest, Converter, LmConfig, WeightStats};
pub use error::{MoshiError, Result, WeightMismatch};
pub use hub::{ArtifactSource, HubClient, HubSettings, LocalSource};
pub use launcher::{
    CommandRunner, CommandSpec, LaunchOptions, LaunchReport, Launcher, LauncherSettings,
    ProcessRunner,
};
pub use models::{needs_conversion, ModelLayout, QuantSpec, Quantization};
