// src/logging.rs
use std::fs::OpenOptions;
use std::path::Path;

use env_logger::{Builder, Env, Target};

use crate::errors::{AppError, Result};

/// Installs the global logger. `RUST_LOG` wins over the `info` default.
///
/// With a `file`, records are appended there instead of stderr, which the
/// TUI needs while it owns the terminal.
pub fn init(file: Option<&Path>) -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if let Some(path) = file {
        let sink = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(sink)));
    }

    builder
        .try_init()
        .map_err(|e| AppError::Config(format!("logger already initialised: {e}")))
}
