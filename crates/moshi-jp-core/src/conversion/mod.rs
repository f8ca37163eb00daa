//! PyTorch checkpoint to MLX conversion.
//!
//! - [`lm_config`]: typed LM hyper-parameters
//! - [`skeleton`]: the parameter set the MLX model expects
//! - [`mapping`]: strict PyTorch to MLX name mapping
//! - [`quantize`]: MLX-compatible affine quantization
//! - [`writer`]: lazy safetensors output
//! - [`Converter`]: the download, convert, and copy pipeline

mod converter;
mod dtype;
pub mod lm_config;
pub mod mapping;
pub mod model_config;
pub mod quantize;
pub mod skeleton;
pub mod writer;

pub use converter::{ConvertOutcome, ConvertRequest, Converter};
pub use dtype::SourceDtype;
pub use lm_config::LmConfig;
pub use mapping::{SourceRef, WeightMap};
pub use skeleton::{ModelSkeleton, ParamKind, ParamSpec};
pub use writer::{convert_checkpoint, Checkpoint, ConversionPlan, WeightStats, WriteProgress};
