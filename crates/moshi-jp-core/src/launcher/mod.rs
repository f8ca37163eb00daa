//! Convert-if-needed, then serve.
//!
//! The launcher never loads weights itself. It checks the model directory for
//! the selected quantization, runs the converter binary when a file is
//! missing (or `--reconvert` is given), and hands the directory to the
//! `moshi_mlx.local_web` server, waiting for each child to exit.

mod runner;
mod settings;

pub use runner::{CommandRunner, CommandSpec, ProcessRunner};
pub use settings::LauncherSettings;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::models::{ModelLayout, Quantization};
use std::path::PathBuf;
use tracing::info;

/// User-selected launch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub quantization: Quantization,
    pub host: String,
    pub port: u16,
    pub no_browser: bool,
    /// Convert even when the model directory is complete.
    pub reconvert: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            quantization: Quantization::Q8,
            host: ServerConfig::DEFAULT_HOST.to_string(),
            port: ServerConfig::DEFAULT_PORT,
            no_browser: false,
            reconvert: false,
        }
    }
}

impl LaunchOptions {
    pub fn with_quantization(mut self, quantization: Quantization) -> Self {
        self.quantization = quantization;
        self
    }

    pub fn with_reconvert(mut self, reconvert: bool) -> Self {
        self.reconvert = reconvert;
        self
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// What a launch did before the server exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub model_dir: PathBuf,
    pub converted: bool,
}

/// Orchestrates the converter and server subprocesses.
pub struct Launcher<R> {
    settings: LauncherSettings,
    runner: R,
}

impl<R: CommandRunner> Launcher<R> {
    pub fn new(settings: LauncherSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn layout(&self, quantization: Quantization) -> ModelLayout {
        ModelLayout::in_models_root(self.settings.models_root(), quantization)
    }

    /// `<converter> --output-dir <dir> [-q <bits>]`
    pub fn conversion_command(&self, layout: &ModelLayout) -> CommandSpec {
        let command = CommandSpec::new(&self.settings.converter).path_arg("--output-dir", layout.dir());
        match layout.quantization().bits() {
            Some(bits) => command.arg("-q").arg(bits.to_string()),
            None => command,
        }
    }

    /// `<python> -m moshi_mlx.local_web ...` for a converted model directory.
    pub fn server_command(&self, layout: &ModelLayout, options: &LaunchOptions) -> CommandSpec {
        let mut command = CommandSpec::new(&self.settings.python)
            .arg("-m")
            .arg(ServerConfig::MODULE)
            .path_arg("--moshi-weight", &layout.weight_path())
            .path_arg("--mimi-weight", &layout.mimi_path())
            .path_arg("--tokenizer", &layout.tokenizer_path())
            .path_arg("--lm-config", &layout.config_path())
            .arg("--host")
            .arg(&options.host)
            .arg("--port")
            .arg(options.port.to_string());
        if let Some(bits) = layout.quantization().bits() {
            command = command.arg("-q").arg(bits.to_string());
        }
        if options.no_browser {
            command = command.arg("--no-browser");
        }
        command
    }

    /// Convert if needed, then run the server until it exits.
    pub async fn run(&self, options: &LaunchOptions) -> Result<LaunchReport> {
        let layout = self.layout(options.quantization);

        let converted = options.reconvert || layout.needs_conversion();
        if converted {
            info!("Converting to MLX format: {}", layout.dir().display());
            info!("The first run downloads about 15GB and takes several minutes");
            self.runner.run(&self.conversion_command(&layout)).await?;
        } else {
            info!("Using converted model: {}", layout.dir().display());
        }

        info!("Starting Moshi server: {}", options.server_url());
        info!("Headphones recommended to prevent echo. Press Ctrl+C to stop");
        self.runner.run(&self.server_command(&layout, options)).await?;

        Ok(LaunchReport {
            model_dir: layout.dir().to_path_buf(),
            converted,
        })
    }
}
