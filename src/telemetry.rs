//! Structured logging setup.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::ValueEnum;
use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Filter used when neither the flag nor `DESKREMOTE_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Output encoding for log events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging options collected from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub filter: String,
    pub format: LogFormat,
    /// Append events here instead of writing them to stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            format: LogFormat::default(),
            log_file: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on first use; later calls do nothing.
pub fn initialise(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| ())
}

fn install_subscriber(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let (writer, ansi) = match &config.log_file {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log(path)?)), false),
        None => (BoxMakeWriter::new(io::stderr), io::stderr().is_terminal()),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

fn open_log(path: &Path) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_filter() {
        let config = TelemetryConfig {
            filter: "deskremote=loudest".to_string(),
            ..TelemetryConfig::default()
        };
        let error = install_subscriber(&config).expect_err("filter must be rejected");
        assert!(matches!(error, TelemetryError::Filter(_)));
    }

    #[test]
    fn unwritable_log_file_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = open_log(&dir.path().join("missing").join("log.txt")).expect_err("no parent");
        assert!(matches!(error, TelemetryError::LogFile { .. }));
    }
}
