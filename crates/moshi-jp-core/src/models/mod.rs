//! Core value types shared by the converter and the launcher.

mod layout;
mod quantization;

pub use layout::{needs_conversion, ModelLayout};
pub use quantization::{QuantSpec, Quantization};
