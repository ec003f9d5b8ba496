//! Tracing setup for netlag
//!
//! The console shows the chosen level plus, unless muted, one line per
//! intercepted call from the `netlag::log` target. Everything down to TRACE
//! also goes to a per-run file so a simulation can be inspected afterwards.

use std::fs::{File, create_dir_all};
use std::io;
use std::path::PathBuf;

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the per-run debug log inside the logs directory.
pub const LOG_FILE_NAME: &str = "netlag-last-run.log";

/// Target used by [`crate::TracingLogSink`] for per-call messages.
pub const CALL_EVENT_TARGET: &str = "netlag::log";

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("Failed to create logs directory {path}: {source}")]
    LogsDir { path: PathBuf, source: io::Error },

    #[error("Failed to create log file {path}: {source}")]
    LogFile { path: PathBuf, source: io::Error },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Minimum level printed to the console
    pub console_level: Level,
    /// Directory receiving [`LOG_FILE_NAME`]
    pub logs_dir: PathBuf,
    /// Print per-call simulation messages even below `console_level`
    pub show_call_events: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            console_level: Level::INFO,
            logs_dir: PathBuf::from("logs"),
            show_call_events: true,
        }
    }
}

impl LogSettings {
    /// Path of the debug log file for these settings.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir.join(LOG_FILE_NAME)
    }

    /// `EnvFilter` directives for the console layer.
    pub fn console_directives(&self) -> String {
        let base = self.console_level.to_string().to_lowercase();
        if self.show_call_events {
            format!("{base},{CALL_EVENT_TARGET}=info")
        } else {
            format!("{base},{CALL_EVENT_TARGET}=off")
        }
    }
}

/// Installs console and file layers as the global subscriber.
///
/// `RUST_LOG`, when set, replaces the console directives. The file is
/// truncated on every run. Returns the log file path.
///
/// # Errors
///
/// - `TracingSetupError::LogsDir` - If the logs directory cannot be created
/// - `TracingSetupError::LogFile` - If the log file cannot be created
/// - `TracingSetupError::AlreadyInitialized` - If a global subscriber is already set
pub fn init_tracing(settings: &LogSettings) -> Result<PathBuf, TracingSetupError> {
    create_dir_all(&settings.logs_dir).map_err(|source| TracingSetupError::LogsDir {
        path: settings.logs_dir.clone(),
        source,
    })?;

    let log_file_path = settings.log_file();
    let log_file = File::create(&log_file_path).map_err(|source| TracingSetupError::LogFile {
        path: log_file_path.clone(),
        source,
    })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.console_directives()));
    let console_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(
        console = %settings.console_directives(),
        file = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(log_file_path)
}

/// Console verbosity selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliLogLevel {
    /// # Examples
    /// ```
    /// use netlag_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Warn.as_tracing_level(), tracing::Level::WARN);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parses_case_insensitively() {
        assert_eq!("WARN".parse::<CliLogLevel>(), Ok(CliLogLevel::Warn));
        assert_eq!(CliLogLevel::Trace.to_string(), "trace");
        assert!("loud".parse::<CliLogLevel>().is_err());
    }

    #[test]
    fn test_console_directives_toggle_call_events() {
        let mut settings = LogSettings {
            console_level: Level::WARN,
            ..LogSettings::default()
        };
        assert_eq!(settings.console_directives(), "warn,netlag::log=info");

        settings.show_call_events = false;
        assert_eq!(settings.console_directives(), "warn,netlag::log=off");
    }

    #[test]
    fn test_init_tracing_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LogSettings {
            logs_dir: dir.path().join("nested"),
            ..LogSettings::default()
        };
        let path = init_tracing(&settings).unwrap();

        assert_eq!(path, dir.path().join("nested").join(LOG_FILE_NAME));
        assert!(path.exists());
        assert!(matches!(
            init_tracing(&settings),
            Err(TracingSetupError::AlreadyInitialized(_))
        ));
    }
}
