//! Restore engine
//!
//! A [`RestoreSession`] owns everything that changes during a run: the active
//! namespace context, the user snapshot, the oplog replay state, and the
//! report counters. It borrows the connection exclusively for the whole run.
//! The walk, the document stream, and the oplog replay all run on one thread,
//! strictly in order.

pub mod dispatch;
pub mod indexes;
pub mod metadata;
pub mod oplog;
pub mod options;
pub mod users;
pub mod walker;

pub use dispatch::StreamStats;
pub use indexes::{classify_index_ack, rewrite_index_definition, IndexAck};
pub use metadata::{load_metadata, metadata_path, CollectionMetadata};
pub use oplog::{Admission, OpTime, OplogReplay, ReplayCounters, ReplayState, ReplayWindow};
pub use options::{build_create_command, options_same};
pub use users::UserSnapshot;
pub use walker::{resolve_namespace, DumpEntry};

use crate::connection::{command_succeeded, error_message, Connection};
use crate::error::RestoreError;
use crate::filter::Predicate;
use crate::types::{NamespaceContext, RestoreScope, OPLOG_FILE};
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Oldest server version that can replay an oplog
const MIN_REPLAY_VERSION: (u64, u64, u64) = (1, 7, 4);

/// Resolved options for one restore run
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOptions {
    pub directory: PathBuf,
    pub scope: RestoreScope,
    pub drop: bool,
    pub restore_options: bool,
    pub restore_indexes: bool,
    pub keep_index_version: bool,
    pub write_concern: u32,
    pub oplog_replay: bool,
    pub oplog_limit: Option<String>,
    pub oplog_filter: Option<Document>,
    pub filter: Option<Document>,
}

impl RestoreOptions {
    /// Full restore of `directory` with the tool's default behaviour
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            scope: RestoreScope::Full,
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

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files_restored: u64,
    pub documents_inserted: u64,
    pub documents_updated: u64,
    pub documents_filtered: u64,
    pub users_removed: u64,
    pub collections_created: u64,
    pub indexes_built: u64,
    pub oplog: Option<ReplayCounters>,
}

impl RestoreReport {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            files_restored: 0,
            documents_inserted: 0,
            documents_updated: 0,
            documents_filtered: 0,
            users_removed: 0,
            collections_created: 0,
            indexes_built: 0,
            oplog: None,
        }
    }
}

/// State of one restore run
pub struct RestoreSession<'c> {
    pub(crate) conn: &'c mut dyn Connection,
    pub(crate) options: RestoreOptions,
    pub(crate) context: Option<NamespaceContext>,
    pub(crate) users: UserSnapshot,
    pub(crate) replay: OplogReplay,
    pub(crate) document_filter: Option<Predicate>,
    pub(crate) report: RestoreReport,
}

impl<'c> RestoreSession<'c> {
    pub fn new(conn: &'c mut dyn Connection, options: RestoreOptions) -> Result<Self, RestoreError> {
        let document_filter = options.filter.as_ref().map(Predicate::parse).transpose()?;
        Ok(Self {
            conn,
            options,
            context: None,
            users: UserSnapshot::default(),
            replay: OplogReplay::default(),
            document_filter,
            report: RestoreReport::start(),
        })
    }

    pub fn options(&self) -> &RestoreOptions {
        &self.options
    }

    pub fn context(&self) -> Option<&NamespaceContext> {
        self.context.as_ref()
    }

    pub fn users(&self) -> &UserSnapshot {
        &self.users
    }

    pub fn replay(&self) -> &OplogReplay {
        &self.replay
    }

    pub fn report(&self) -> &RestoreReport {
        &self.report
    }

    /// Run the whole restore: preflight, walk the dump tree, replay the oplog
    pub fn run(mut self) -> Result<RestoreReport, RestoreError> {
        let root = self.options.directory.clone();

        self.preflight(&root)?;
        if self.options.oplog_replay {
            self.configure_replay()?;
        }

        self.walk(&root)?;
        self.report_pending_error();

        if self.options.oplog_replay {
            self.replay_oplog(&root.join(OPLOG_FILE))?;
        }

        self.report.finished_at = Some(Utc::now());
        Ok(self.report)
    }

    /// Checks that must pass before anything is written
    pub fn preflight(&mut self, root: &Path) -> Result<(), RestoreError> {
        if !self.conn.is_primary_writable()? {
            return Err(RestoreError::NotWritable);
        }

        if self.options.scope.is_full()
            && root.join("config").exists()
            && self.conn.is_sharded_router()?
        {
            return Err(RestoreError::ShardedFullRestore);
        }

        if self.options.oplog_replay {
            if !self.options.scope.is_full() {
                return Err(RestoreError::OplogRequiresFullRestore);
            }
            let oplog = root.join(OPLOG_FILE);
            if !oplog.exists() {
                return Err(RestoreError::OplogFileMissing(oplog));
            }
            self.check_replay_version()?;
        }

        Ok(())
    }

    fn check_replay_version(&mut self) -> Result<(), RestoreError> {
        let reply = self.conn.run_command("admin", doc! { "buildinfo": 1 })?;
        if !command_succeeded(&reply) {
            return Err(RestoreError::BuildInfoFailed(error_message(&reply)));
        }
        let version = reply.get_str("version").unwrap_or_default().to_string();
        if !version_at_least(&version, MIN_REPLAY_VERSION) {
            return Err(RestoreError::UnsupportedServerVersion(version));
        }
        Ok(())
    }

    /// Surface any error left behind by the last write of the walk
    fn report_pending_error(&mut self) {
        let db = self.options.scope.database().unwrap_or("admin").to_string();
        match self.conn.get_last_error(&db, 0) {
            Ok(Some(err)) => error!(db = %db, "{}", err),
            Ok(None) => {}
            Err(e) => error!(db = %db, error = %e, "Failed to fetch last error"),
        }
    }

    /// Wait for the configured number of replicas after a write. Failures are
    /// reported, never fatal.
    pub(crate) fn await_replication(&mut self, db: &str, failure: &str) {
        let w = self.options.write_concern;
        if w == 0 {
            return;
        }
        match self.conn.get_last_error(db, w) {
            Ok(Some(err)) => error!(db = %db, w, "{}{}", failure, err),
            Ok(None) => {}
            Err(e) => error!(db = %db, w, error = %e, "{}acknowledgement unavailable", failure),
        }
    }

    pub(crate) fn log_summary(&self) {
        info!(
            files = self.report.files_restored,
            inserted = self.report.documents_inserted,
            updated = self.report.documents_updated,
            indexes = self.report.indexes_built,
            "Restore walk finished"
        );
    }
}

/// Compare the numeric `major.minor.patch` prefix of a server version.
/// Pre-release suffixes (`1.7.4-rc0`) count as the release itself.
pub fn version_at_least(version: &str, minimum: (u64, u64, u64)) -> bool {
    let mut parts = version.split('.').map(|part| {
        part.chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse::<u64>()
            .unwrap_or(0)
    });
    let found = (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    found >= minimum
}
