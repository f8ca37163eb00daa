//! moshi-jp-convert - Download LLM-jp-Moshi-v1 and convert it to MLX format.

use anyhow::{Context, Result};
use clap::Parser;
use moshi_jp_cli::{logging, parse_bits};
use moshi_jp_core::config::HubConfig;
use moshi_jp_core::{ConvertRequest, Converter, HubClient, HubSettings, Quantization};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "moshi-jp-convert")]
#[command(about = "Convert llm-jp/llm-jp-moshi-v1 from PyTorch to MLX format")]
struct Args {
    /// Directory to write the converted model into
    #[arg(long)]
    output_dir: PathBuf,

    /// Quantization bits (4 or 8); omit for bfloat16
    #[arg(short, long, value_parser = parse_bits)]
    quantize: Option<u32>,

    /// Hub revision (branch, tag, or commit) to download
    #[arg(long, default_value = HubConfig::DEFAULT_REVISION)]
    revision: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug);

    let quantization = Quantization::from_bits(args.quantize)?;
    let settings = HubSettings::from_env()?.with_revision(&args.revision);
    info!("Hub cache: {}", settings.cache_dir.display());

    let client = HubClient::new(HubConfig::REPO_ID, settings)?;
    let converter = Converter::new(client);
    let request = ConvertRequest::new(&args.output_dir, quantization);

    converter
        .convert(&request)
        .await
        .with_context(|| format!("converting into {}", args.output_dir.display()))?;
    Ok(())
}
