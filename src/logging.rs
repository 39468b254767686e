//! Diagnostic Logging
//!
//! Builds the tracing subscriber: timestamped events on stderr (stdout is
//! reserved for structured command output) and, optionally, the same events
//! appended to a log file.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Output format for the stderr layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    /// Parse a configured format name; unknown names fall back to compact
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber
///
/// `default_level` applies unless `RUST_LOG` says otherwise. A log file that
/// cannot be opened is reported on stderr and skipped; diagnostics are
/// advisory and never stop the watchdog.
pub fn init_logging(config: &LoggingConfig, default_level: Level) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer(LogFormat::from_name(&config.format))];

    let mut file_error = None;
    if config.log_to_file {
        if let Some(path) = &config.log_file {
            match file_layer(path) {
                Ok(layer) => layers.push(layer),
                Err(e) => file_error = Some(e),
            }
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(e) = file_error {
        tracing::warn!("Log file disabled: {:#}", e);
    }
    Ok(())
}

fn stderr_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Compact => fmt::layer().compact().with_writer(io::stderr).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
    }
}

fn file_layer(path: &Path) -> Result<BoxedLayer> {
    let file = open_log_file(path)?;
    Ok(fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .boxed())
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}
