//! Shared pieces of the `moshi-jp-convert` and `moshi-jp-launch` binaries.

pub mod logging;

use moshi_jp_core::Quantization;

/// Converter `-q` values: `4` or `8`.
pub fn parse_bits(value: &str) -> Result<u32, String> {
    match value.trim() {
        "4" => Ok(4),
        "8" => Ok(8),
        other => Err(format!("invalid bit width '{other}', expected 4 or 8")),
    }
}

/// Launcher `-q` values: `4`, `8`, or `none`/`bf16`.
pub fn parse_quantization(value: &str) -> Result<Quantization, String> {
    value.parse().map_err(|e: moshi_jp_core::MoshiError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bits() {
        assert_eq!(parse_bits("4"), Ok(4));
        assert_eq!(parse_bits("8"), Ok(8));
        assert!(parse_bits("16").is_err());
        assert!(parse_bits("none").is_err());
    }

    #[test]
    fn test_parse_quantization() {
        assert_eq!(parse_quantization("8"), Ok(Quantization::Q8));
        assert_eq!(parse_quantization("none"), Ok(Quantization::None));
        assert!(parse_quantization("2").is_err());
    }
}
