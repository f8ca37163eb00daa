//! moshi-jp-launch - Convert LLM-jp-Moshi-v1 if needed, then start the MLX server.

use anyhow::Result;
use clap::Parser;
use moshi_jp_cli::{logging, parse_quantization};
use moshi_jp_core::config::ServerConfig;
use moshi_jp_core::{LaunchOptions, Launcher, LauncherSettings, ProcessRunner, Quantization};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "moshi-jp-launch")]
#[command(about = "LLM-jp-Moshi-v1 launcher for Apple Silicon (MLX)")]
struct Args {
    /// Quantization level: 4, 8, or none (default: 8)
    #[arg(short, long, default_value = "8", value_parser = parse_quantization)]
    quantize: Quantization,

    /// Port for the web UI
    #[arg(long, default_value_t = ServerConfig::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = ServerConfig::DEFAULT_HOST)]
    host: String,

    /// Do not open a browser
    #[arg(long)]
    no_browser: bool,

    /// Convert again even when a converted model exists
    #[arg(long)]
    reconvert: bool,

    /// Root directory of converted models (default: <user data dir>/moshi-jp/models)
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Python interpreter with moshi_mlx installed (default: python3)
    #[arg(long)]
    python: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug);

    let settings = LauncherSettings::resolve(args.models_dir, args.python)?;
    debug!("Launcher settings: {:?}", settings);

    let options = LaunchOptions {
        quantization: args.quantize,
        host: args.host,
        port: args.port,
        no_browser: args.no_browser,
        reconvert: args.reconvert,
    };
    Launcher::new(settings, ProcessRunner).run(&options).await?;
    Ok(())
}
