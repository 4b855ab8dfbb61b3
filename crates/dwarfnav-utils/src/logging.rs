//! # Logging Utilities
//!
//! Logging setup for the dwarfnav tools using `tracing`.
//!
//! Console output goes to stderr, so that dumps written to stdout stay clean
//! when piped. An optional file layer writes the same events without ANSI
//! colours.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dwarfnav_utils::init_logging;
//!
//! // Reads RUST_LOG, DWARFNAV_LOG_FORMAT and DWARFNAV_LOG_FILE
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::info!("started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (e.g. `RUST_LOG=debug`, `RUST_LOG=dwarfnav_core=trace`)
//! - `DWARFNAV_LOG_FORMAT`: `json` or `pretty` (default `pretty`)
//! - `DWARFNAV_LOG_FILE`: optional log file path
//!
//! The returned [`LogGuard`] flushes the file writer when dropped; keep it
//! alive for as long as the program logs.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const FORMAT_VAR: &str = "DWARFNAV_LOG_FORMAT";
/// Environment variable naming a log file
pub const FILE_VAR: &str = "DWARFNAV_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    /// Includes per-instruction expression and CFI stepping
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Everything [`init_logging_with`] needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig
{
    /// Explicit level; `None` defers to `RUST_LOG`, then `warn`
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogConfig
{
    /// Read the format and file from the environment.
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` if `DWARFNAV_LOG_FORMAT` is set to an unknown value.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        let format = match env::var(FORMAT_VAR) {
            Ok(value) => value.parse()?,
            Err(_) => LogFormat::default(),
        };
        Ok(Self {
            level: None,
            format,
            file: env::var_os(FILE_VAR).map(PathBuf::from),
        })
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self
    {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: PathBuf) -> Self
    {
        self.file = Some(file);
        self
    }

    fn filter(&self) -> EnvFilter
    {
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string())),
        }
    }
}

/// A date-stamped log file name inside `dir`, e.g. `2025-01-31-dwarfnav.log`
pub fn dated_log_file(dir: &Path) -> PathBuf
{
    dir.join(format!("{}-dwarfnav.log", Utc::now().format("%Y-%m-%d")))
}

/// Keeps the file writer alive; dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LogGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment.
///
/// ## Errors
///
/// Returns an error if:
/// - a global subscriber is already installed
/// - `DWARFNAV_LOG_FORMAT` has an unknown value
/// - the log file's directory cannot be created
pub fn init_logging() -> Result<LogGuard, LoggingError>
{
    init_logging_with(LogConfig::from_env()?)
}

/// Initialize logging with an explicit level and format.
///
/// `DWARFNAV_LOG_FILE` is still honoured.
///
/// ## Errors
///
/// As for [`init_logging`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LogGuard, LoggingError>
{
    let mut config = LogConfig::from_env().unwrap_or_default();
    config.level = Some(level);
    config.format = format;
    init_logging_with(config)
}

/// Initialize logging from a full configuration.
///
/// ## Errors
///
/// `InitializationFailed` if a global subscriber is already installed, or
/// `FileError` if the log file's directory cannot be created.
pub fn init_logging_with(config: LogConfig) -> Result<LogGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.format, config.filter())];
    let mut guard = LogGuard::default();

    if let Some(path) = &config.file {
        let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let file_name = path.file_name().ok_or_else(|| LoggingError::InvalidFile(path.clone()))?;
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false);
        layers.push(match config.format {
            LogFormat::Pretty => layer.with_filter(config.filter()).boxed(),
            LogFormat::Json => layer.json().with_current_span(true).with_filter(config.filter()).boxed(),
        });
        guard._file = Some(file_guard);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(guard)
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339());
    match format {
        LogFormat::Pretty => layer.with_ansi(true).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Unknown log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    #[error("Unknown log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    #[error("Log file path has no file name: {}", .0.display())]
    InvalidFile(PathBuf),

    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
