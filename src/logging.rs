//! Logging
//!
//! Restore progress is reported through `tracing` events. The subscriber is
//! installed once by the binary; logs go to stderr by default so the summary
//! printed on stdout stays clean.
//!
//! Environment variables win over the merged configuration:
//! `BSONRESTORE_LOG` (a full filter), `BSONRESTORE_LOG_FORMAT`,
//! `BSONRESTORE_LOG_OUTPUT` and `BSONRESTORE_LOG_MODULES` (`target=level,...`).

use crate::error::RestoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const FILTER_ENV: &str = "BSONRESTORE_LOG";
const FORMAT_ENV: &str = "BSONRESTORE_LOG_FORMAT";
const OUTPUT_ENV: &str = "BSONRESTORE_LOG_OUTPUT";
const MODULES_ENV: &str = "BSONRESTORE_LOG_MODULES";

/// `[logging]` section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error or off
    #[serde(default = "default_level")]
    pub level: String,

    /// text or json
    #[serde(default = "default_format")]
    pub format: String,

    /// stdout, stderr or file
    #[serde(default = "default_output")]
    pub output: String,

    /// Destination when `output` is "file"
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// ANSI colors for text output on a terminal stream
    #[serde(default = "default_color")]
    pub color: bool,

    /// Per-target levels, e.g. `bsonrestore::restore::oplog = "trace"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("bsonrestore.log")
}

fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_color(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = RestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(RestoreError::ConfigError(format!(
                "Invalid log format: {} (expected text or json)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Stdout,
    Stderr,
    File,
}

impl FromStr for Sink {
    type Err = RestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(Sink::Stdout),
            "stderr" => Ok(Sink::Stderr),
            "file" => Ok(Sink::File),
            other => Err(RestoreError::ConfigError(format!(
                "Invalid log output: {} (expected stdout, stderr or file)",
                other
            ))),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), RestoreError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = build_filter(config, std::env::var(MODULES_ENV).ok().as_deref())?;
    let format: LogFormat = env_or(FORMAT_ENV, &config.format).parse()?;
    let sink: Sink = env_or(OUTPUT_ENV, &config.output).parse()?;
    let ansi = config.color && sink != Sink::File;

    let writer = match sink {
        Sink::Stdout => BoxMakeWriter::new(std::io::stdout),
        Sink::Stderr => BoxMakeWriter::new(std::io::stderr),
        Sink::File => BoxMakeWriter::new(Mutex::new(open_log_file(&config.file)?)),
    };

    let registry = Registry::default().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init(),
    };

    installed.map_err(|e| RestoreError::ConfigError(format!("Failed to install logger: {}", e)))
}

fn env_or(var: &str, fallback: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| fallback.to_string())
}

fn open_log_file(path: &Path) -> Result<File, RestoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            RestoreError::ConfigError(format!(
                "Failed to create log directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            RestoreError::ConfigError(format!(
                "Failed to open log file {}: {}",
                path.display(),
                e
            ))
        })
}

/// `BSONRESTORE_LOG` replaces everything; otherwise the configured level plus
/// per-target directives from the config and from `env_modules`.
fn build_filter(config: &LoggingConfig, env_modules: Option<&str>) -> Result<EnvFilter, RestoreError> {
    if let Ok(filter) = EnvFilter::try_from_env(FILTER_ENV) {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let configured = config
        .modules
        .iter()
        .map(|(target, level)| (target.clone(), level.clone()));
    let from_env = env_modules.map(module_levels).unwrap_or_default();

    configured
        .chain(from_env)
        .try_fold(EnvFilter::new(&config.level), |filter, (target, level)| {
            let directive: Directive = format!("{}={}", target, level).parse().map_err(|e| {
                RestoreError::ConfigError(format!("Invalid log directive {}={}: {}", target, level, e))
            })?;
            Ok(filter.add_directive(directive))
        })
}

/// Parse `target=level,target=level`; entries without `=` are ignored
fn module_levels(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| entry.split_once('='))
        .map(|(target, level)| (target.trim().to_string(), level.trim().to_string()))
        .filter(|(target, level)| !target.is_empty() && !level.is_empty())
        .collect()
}
