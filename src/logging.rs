//! Tracing subscriber setup for the `conductor` binary.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::LoggingSection;

/// Name prefix of the daily log files under `.conductor/logs`.
pub const LOG_FILE_PREFIX: &str = "conductor.log";

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(section: &LoggingSection, verbose: bool) -> &str {
    if verbose { "debug" } else { section.level.as_str() }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `[logging] level`; `--verbose` raises the default
/// to `debug`. Events go to stderr, and also to a daily-rolling file when
/// `[logging] file` is set. The returned guard must be held until exit so
/// buffered file output is flushed.
pub fn init(section: &LoggingSection, logs_dir: &Path, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(section, verbose))
            .with_context(|| format!("Invalid log level '{}'", section.level))?,
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);
    if section.json {
        layers.push(stderr.json().boxed());
    } else {
        layers.push(stderr.boxed());
    }

    let guard = if section.file {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create log directory {}", logs_dir.display()))?;
        let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file = fmt::layer().with_writer(writer).with_ansi(false);
        if section.json {
            layers.push(file.json().boxed());
        } else {
            layers.push(file.boxed());
        }
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
