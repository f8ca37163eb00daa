//! Subprocess execution.

use crate::error::{MoshiError, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add a flag followed by a path value.
    pub fn path_arg(self, flag: &str, path: &Path) -> Self {
        self.arg(flag).arg(path.display().to_string())
    }

    /// Value following `flag`, if present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| arg == flag)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Runs a command to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` with inherited stdio and wait for it to exit.
    ///
    /// A non-zero exit is an error.
    async fn run(&self, command: &CommandSpec) -> Result<()>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<()> {
        debug!("Running: {}", command);
        let status = Command::new(&command.program)
            .args(&command.args)
            .status()
            .await
            .map_err(|e| MoshiError::LaunchFailed {
                program: command.program.clone(),
                message: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(MoshiError::ProcessFailed {
                program: command.program.clone(),
                // Killed by a signal: no exit code.
                code: status.code().unwrap_or(-1),
            })
        }
    }
}
