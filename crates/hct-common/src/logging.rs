//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Shared primitives and utilities for the update agent."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
//! Agent diagnostics: a console layer plus a rolling JSON file.
//!
//! Per-run update logs are not routed through here; the orchestrator writes
//! them directly so they stay readable without a subscriber.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "HCT_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Console format for the agent's own diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// How often the diagnostics file rolls over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    /// A single `<prefix>.log` that is never rotated.
    Never,
}

impl LogRotation {
    fn rotation(self) -> Rotation {
        match self {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Keeps the non-blocking writers alive; buffered lines are flushed on drop.
#[must_use = "dropping the guard stops log output"]
pub struct LoggingGuard {
    _file: WorkerGuard,
    _console: WorkerGuard,
}

/// Install the global subscriber described by `config`.
///
/// The filter is taken from `HCT_LOG`, then `RUST_LOG`, then `logging.level`,
/// then `info`. An unparsable directive falls through to the next source.
/// When a subscriber is already installed the writers are still created so the
/// returned guard is valid, but events keep flowing to the existing one.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let (file_writer, file_guard) = file_writer(&config.directory, prefix, config.rotation)?;
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stdout());

    let directive = filter_directive(
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
        config.level.as_deref(),
    );

    let console_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(console_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(console_writer)
            .boxed(),
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    let installed = tracing_subscriber::registry()
        .with(EnvFilter::new(&directive))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        info!(
            service = %service_name,
            log_dir = %config.directory.display(),
            filter = %directive,
            format = ?config.format,
            rotation = ?config.rotation,
            "tracing initialised"
        );
    }
    Ok(LoggingGuard {
        _file: file_guard,
        _console: console_guard,
    })
}

fn file_writer(
    directory: &Path,
    prefix: &str,
    rotation: LogRotation,
) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(rotation.rotation())
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(directory)
        .with_context(|| format!("failed to open log file in {}", directory.display()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// First usable filter directive, in priority order.
fn filter_directive(hct_log: Option<&str>, rust_log: Option<&str>, configured: Option<&str>) -> String {
    [(LOG_ENV, hct_log), (EnvFilter::DEFAULT_ENV, rust_log), ("logging.level", configured)]
        .into_iter()
        .filter_map(|(source, value)| Some((source, value?.trim())))
        .filter(|(_, value)| !value.is_empty())
        .find(|(source, value)| match EnvFilter::try_new(value) {
            Ok(_) => true,
            Err(err) => {
                eprintln!("ignoring invalid {source} directive '{value}': {err}");
                false
            }
        })
        .map(|(_, value)| value.to_owned())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_owned())
}
