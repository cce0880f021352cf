//! Configuration System
//!
//! Layered configuration for a restore run: merge-policy defaults, the global
//! config file, an explicit `--config` file, `BSONRESTORE__*` environment
//! variables, and finally command-line flags (applied by the CLI).

use crate::codec::decode_json_document;
use crate::error::RestoreError;
use crate::logging::LoggingConfig;
use crate::restore::RestoreOptions;
use crate::types::RestoreScope;
use bson::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge;
mod sources;

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BsonRestoreConfig {
    /// Target server
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// What to restore and how
    #[serde(default)]
    pub restore: RestoreSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection string
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_app_name() -> String {
    "bsonrestore".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            app_name: default_app_name(),
        }
    }
}

/// Restore behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSettings {
    /// Dump root: a directory tree, or a single data file
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Restore into this database instead of the dumped one
    #[serde(default)]
    pub db: Option<String>,

    /// Restore into this collection instead of the dumped one
    #[serde(default)]
    pub collection: Option<String>,

    /// Drop each collection before restoring it
    #[serde(default)]
    pub drop: bool,

    /// Create collections with the options recorded in metadata files
    #[serde(default = "default_true")]
    pub restore_options: bool,

    /// Build the indexes recorded in metadata files
    #[serde(default = "default_true")]
    pub restore_indexes: bool,

    /// Keep the index format version recorded in the dump
    #[serde(default)]
    pub keep_index_version: bool,

    /// Replicas to wait for after each write (0 = no wait)
    #[serde(default)]
    pub write_concern: u32,

    /// Replay the dumped oplog after restoring collections
    #[serde(default)]
    pub oplog_replay: bool,

    /// Only replay entries older than this timestamp (`secs[:inc]`)
    #[serde(default)]
    pub oplog_limit: Option<String>,

    /// Extra JSON match conditions for replayed oplog entries
    #[serde(default)]
    pub oplog_filter: Option<String>,

    /// JSON predicate restored documents must match
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_directory() -> PathBuf {
    PathBuf::from("dump")
}

fn default_true() -> bool {
    true
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            db: None,
            collection: None,
            drop: false,
            restore_options: true,
            restore_indexes: true,
            keep_index_version: false,
            write_concern: 0,
            oplog_replay: false,
            oplog_limit: None,
            oplog_filter: None,
            filter: None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn parse_predicate(label: &str, text: &Option<String>) -> Result<Option<Document>, RestoreError> {
    match non_empty(text) {
        None => Ok(None),
        Some(text) => decode_json_document(&text)
            .map(Some)
            .map_err(|e| RestoreError::ConfigError(format!("Invalid {}: {}", label, e))),
    }
}

impl RestoreSettings {
    /// Restore scope implied by the database and collection overrides
    pub fn scope(&self) -> Result<RestoreScope, RestoreError> {
        RestoreScope::from_overrides(non_empty(&self.db), non_empty(&self.collection)).ok_or_else(
            || RestoreError::ConfigError("--collection requires --db".to_string()),
        )
    }

    /// Validate and resolve into the engine's options
    pub fn resolve(&self) -> Result<RestoreOptions, RestoreError> {
        if self.directory.as_os_str().is_empty() {
            return Err(RestoreError::ConfigError(
                "Restore directory cannot be empty".to_string(),
            ));
        }

        Ok(RestoreOptions {
            directory: self.directory.clone(),
            scope: self.scope()?,
            drop: self.drop,
            restore_options: self.restore_options,
            restore_indexes: self.restore_indexes,
            keep_index_version: self.keep_index_version,
            write_concern: self.write_concern,
            oplog_replay: self.oplog_replay,
            oplog_limit: non_empty(&self.oplog_limit),
            oplog_filter: parse_predicate("oplog filter", &self.oplog_filter)?,
            filter: parse_predicate("filter", &self.filter)?,
        })
    }
}

/// Loads [`BsonRestoreConfig`] from all configuration sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, the global file, and the environment
    pub fn load() -> Result<BsonRestoreConfig, RestoreError> {
        Self::load_layers(None)
    }

    /// Like [`ConfigLoader::load`], with an explicit file layered above the global one
    pub fn load_from_file(path: &Path) -> Result<BsonRestoreConfig, RestoreError> {
        if !path.exists() {
            return Err(RestoreError::ConfigError(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        Self::load_layers(Some(path))
    }

    fn load_layers(explicit: Option<&Path>) -> Result<BsonRestoreConfig, RestoreError> {
        let mut builder = merge::merge_policy::builder_with_defaults()?;
        builder = sources::global_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            builder = sources::explicit_file::add_to_builder(builder, path)?;
        }
        builder = sources::environment::add_to_builder(builder);

        let config: BsonRestoreConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
