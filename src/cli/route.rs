//! CLI route: run context. Resolves configuration, connects, and drives one restore.

use crate::config::{BsonRestoreConfig, ConfigLoader};
use crate::connection::{Connection, MongoConnection};
use crate::error::RestoreError;
use crate::restore::{RestoreReport, RestoreSession};
use std::time::Instant;
use tracing::info;

use crate::cli::parse::Cli;
use crate::cli::presentation::format_report;

/// Runtime context for CLI execution: the effective configuration after every
/// layer, CLI flags included, has been applied.
pub struct RunContext {
    config: BsonRestoreConfig,
}

impl RunContext {
    /// Load configuration layers, then apply CLI overrides on top
    pub fn new(cli: &Cli) -> Result<Self, RestoreError> {
        let config = match cli.config {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        Ok(Self::with_config(config, cli))
    }

    /// Apply CLI overrides to an already loaded configuration
    pub fn with_config(mut config: BsonRestoreConfig, cli: &Cli) -> Self {
        let restore = &mut config.restore;
        if let Some(dir) = cli.directory() {
            restore.directory = dir.clone();
        }
        if let Some(ref uri) = cli.uri {
            config.connection.uri = uri.clone();
        }
        if cli.db.is_some() {
            restore.db = cli.db.clone();
        }
        if cli.collection.is_some() {
            restore.collection = cli.collection.clone();
        }
        if cli.drop {
            restore.drop = true;
        }
        if cli.no_options_restore {
            restore.restore_options = false;
        }
        if cli.no_index_restore {
            restore.restore_indexes = false;
        }
        if cli.keep_index_version {
            restore.keep_index_version = true;
        }
        if let Some(w) = cli.write_concern {
            restore.write_concern = w;
        }
        if cli.oplog_replay {
            restore.oplog_replay = true;
        }
        if cli.oplog_limit.is_some() {
            restore.oplog_limit = cli.oplog_limit.clone();
        }
        if cli.oplog_filter.is_some() {
            restore.oplog_filter = cli.oplog_filter.clone();
        }
        if cli.filter.is_some() {
            restore.filter = cli.filter.clone();
        }
        Self { config }
    }

    pub fn config(&self) -> &BsonRestoreConfig {
        &self.config
    }

    /// Connect to the configured server and run the restore
    pub fn execute(&self) -> Result<String, RestoreError> {
        let options = self.config.restore.resolve()?;
        let mut conn = MongoConnection::connect(&self.config.connection, options.write_concern)?;
        self.execute_with(&mut conn)
    }

    /// Run the restore against an existing connection and render the summary
    pub fn execute_with(&self, conn: &mut dyn Connection) -> Result<String, RestoreError> {
        let report = self.restore(conn)?;
        Ok(format_report(&report))
    }

    fn restore(&self, conn: &mut dyn Connection) -> Result<RestoreReport, RestoreError> {
        let options = self.config.restore.resolve()?;
        let started = Instant::now();
        info!(
            directory = %options.directory.display(),
            scope = ?options.scope,
            drop = options.drop,
            w = options.write_concern,
            "Starting restore"
        );
        let report = RestoreSession::new(conn, options)?.run()?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            files = report.files_restored,
            "Restore complete"
        );
        Ok(report)
    }
}
