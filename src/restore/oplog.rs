//! Oplog replay filter and applier
//!
//! Replay moves through `Idle → Configured → Streaming → Done`. Configuration
//! happens once, before any collection is restored: the operator's upper
//! bound is parsed, the target's own replication log is probed for its newest
//! entry, and the admission predicate is fixed. Streaming then runs one pass
//! over the dumped oplog after every collection has been restored.

use super::RestoreSession;
use crate::connection::{command_succeeded, error_message, QueryOptions};
use crate::error::RestoreError;
use crate::filter::Predicate;
use crate::types::{database_of, Namespace, NamespaceContext, SERVER_OPLOG_NAMESPACE};
use bson::{doc, Bson, Document, Timestamp};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Operation-type prefix of entries that mutate nothing
const NOOP_MARKER: char = 'n';

/// An oplog position: seconds plus an increment within that second
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OpTime {
    pub secs: u32,
    pub inc: u32,
}

impl OpTime {
    pub fn new(secs: u32, inc: u32) -> Self {
        Self { secs, inc }
    }

    pub fn to_timestamp(self) -> Timestamp {
        Timestamp {
            time: self.secs,
            increment: self.inc,
        }
    }
}

impl From<Timestamp> for OpTime {
    fn from(ts: Timestamp) -> Self {
        Self::new(ts.time, ts.increment)
    }
}

impl fmt::Display for OpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.secs, self.inc)
    }
}

/// Parses `secs[:inc]`; a missing or empty increment is 0
impl FromStr for OpTime {
    type Err = RestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RestoreError::InvalidOplogLimit(s.to_string());
        let (secs, inc) = match s.trim().split_once(':') {
            Some((secs, inc)) => (secs, inc),
            None => (s.trim(), ""),
        };
        let secs = secs.parse::<u32>().map_err(|_| invalid())?;
        let inc = if inc.is_empty() {
            0
        } else {
            inc.parse::<u32>().map_err(|_| invalid())?
        };
        Ok(Self::new(secs, inc))
    }
}

/// Timestamps an entry must fall strictly between to be replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayWindow {
    after: Option<OpTime>,
    before: OpTime,
}

impl ReplayWindow {
    /// Fails when the newest entry already on the server is not older than `before`
    pub fn new(after: Option<OpTime>, before: OpTime) -> Result<Self, RestoreError> {
        if let Some(latest) = after {
            if latest >= before {
                return Err(RestoreError::OplogLimitNotNewer {
                    latest: latest.to_string(),
                    limit: before.to_string(),
                });
            }
        }
        Ok(Self { after, before })
    }

    pub fn after(&self) -> Option<OpTime> {
        self.after
    }

    pub fn before(&self) -> OpTime {
        self.before
    }

    pub fn contains(&self, ts: OpTime) -> bool {
        self.after.map_or(true, |after| ts > after) && ts < self.before
    }

    /// `{ts: {$gt: after, $lt: before}}`
    pub fn to_query(&self) -> Document {
        let mut bounds = Document::new();
        if let Some(after) = self.after {
            bounds.insert("$gt", after.to_timestamp());
        }
        bounds.insert("$lt", self.before.to_timestamp());
        doc! { "ts": bounds }
    }
}

/// Applied and skipped entry counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayCounters {
    pub applied: u64,
    pub skipped: u64,
}

impl ReplayCounters {
    pub fn total(&self) -> u64 {
        self.applied + self.skipped
    }
}

impl fmt::Display for ReplayCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Applied {} oplog entries out of {} ({} skipped).",
            self.applied,
            self.total(),
            self.skipped
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplayState {
    #[default]
    Idle,
    Configured,
    Streaming,
    Done,
}

/// What to do with one dumped oplog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No-op entry; not counted
    NoOp,
    /// Outside the window or predicate; counted as skipped
    Skipped,
    Apply,
}

/// Replay filter state for one run
#[derive(Debug, Default)]
pub struct OplogReplay {
    state: ReplayState,
    window: Option<ReplayWindow>,
    predicate: Option<Predicate>,
    counters: ReplayCounters,
}

impl OplogReplay {
    /// Fix the window and extra match conditions; counters start at zero
    pub fn configure(
        &mut self,
        window: Option<ReplayWindow>,
        extra: Option<&Document>,
    ) -> Result<(), RestoreError> {
        let combined = match (window.map(|w| w.to_query()), extra) {
            (Some(window), Some(extra)) => Some(doc! { "$and": [window, extra.clone()] }),
            (Some(window), None) => Some(window),
            (None, Some(extra)) => Some(extra.clone()),
            (None, None) => None,
        };
        self.predicate = combined.as_ref().map(Predicate::parse).transpose()?;
        self.window = window;
        self.counters = ReplayCounters::default();
        self.state = ReplayState::Configured;
        Ok(())
    }

    pub fn has_window(&self) -> bool {
        self.window.is_some()
    }

    pub fn window(&self) -> Option<&ReplayWindow> {
        self.window.as_ref()
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn counters(&self) -> ReplayCounters {
        self.counters
    }

    pub fn begin(&mut self) {
        self.state = ReplayState::Streaming;
    }

    pub fn finish(&mut self) -> ReplayCounters {
        self.state = ReplayState::Done;
        self.counters
    }

    /// Classify an entry, counting it as skipped when it is filtered out
    pub fn admit(&mut self, entry: &Document) -> Admission {
        if is_noop(entry) {
            return Admission::NoOp;
        }
        match &self.predicate {
            Some(predicate) if !predicate.matches(entry) => {
                self.counters.skipped += 1;
                Admission::Skipped
            }
            _ => Admission::Apply,
        }
    }

    pub fn record_skipped(&mut self) {
        self.counters.skipped += 1;
    }

    pub fn record_applied(&mut self) {
        self.counters.applied += 1;
    }
}

/// Whether an entry's operation type marks it as a no-op
pub fn is_noop(entry: &Document) -> bool {
    entry
        .get_str("op")
        .is_ok_and(|op| op.starts_with(NOOP_MARKER))
}

/// Database named by an entry's target namespace
pub fn target_database(entry: &Document) -> Option<&str> {
    entry
        .get_str("ns")
        .ok()
        .map(database_of)
        .filter(|db| !db.is_empty())
}

impl RestoreSession<'_> {
    /// Parse the limit, probe the server's log, and fix the admission predicate
    pub(crate) fn configure_replay(&mut self) -> Result<(), RestoreError> {
        let window = match self.options.oplog_limit.as_deref() {
            None => None,
            Some(limit) => {
                let before: OpTime = limit.parse()?;
                let latest = self.latest_server_optime()?;
                if let Some(latest) = latest {
                    info!("Latest oplog entry on the server is {}", latest);
                }
                Some(ReplayWindow::new(latest, before)?)
            }
        };

        self.replay
            .configure(window, self.options.oplog_filter.as_ref())?;

        if let Some(predicate) = self.replay.predicate() {
            info!(
                "Only applying oplog entries matching this criteria: {}",
                Bson::Document(predicate.source().clone()).into_relaxed_extjson()
            );
        }
        Ok(())
    }

    /// Timestamp of the newest entry in the target's replication log
    fn latest_server_optime(&mut self) -> Result<Option<OpTime>, RestoreError> {
        let ns = Namespace::parse(SERVER_OPLOG_NAMESPACE)?;
        let newest = self.conn.query(
            &ns,
            doc! {},
            QueryOptions {
                projection: Some(doc! { "ts": 1 }),
                ..QueryOptions::newest_first(1)
            },
        )?;
        Ok(newest
            .first()
            .and_then(|entry| entry.get_timestamp("ts").ok())
            .map(OpTime::from))
    }

    /// Stream the dumped oplog through the dispatcher
    pub(crate) fn replay_oplog(&mut self, path: &Path) -> Result<(), RestoreError> {
        info!(path = %path.display(), "Replaying oplog");
        self.context = Some(NamespaceContext::OplogReplay);
        self.replay.begin();

        let result = self.restore_stream(path);

        let counters = self.replay.finish();
        self.context = None;
        result?;

        info!("{}", counters);
        self.report.oplog = Some(counters);
        Ok(())
    }

    /// Apply one dumped oplog entry as a single-operation batch
    pub(crate) fn apply_oplog_entry(&mut self, entry: Document) {
        match self.replay.admit(&entry) {
            Admission::NoOp | Admission::Skipped => return,
            Admission::Apply => {}
        }

        let db = match target_database(&entry) {
            Some(db) => db.to_string(),
            None => {
                warn!("Skipping oplog entry without a target namespace");
                self.replay.record_skipped();
                return;
            }
        };

        let ts = entry.get_timestamp("ts").ok().map(OpTime::from);
        debug!(db = %db, ts = ?ts, "Applying oplog entry");

        match self
            .conn
            .run_command(&db, doc! { "applyOps": [Bson::Document(entry)] })
        {
            Ok(reply) if command_succeeded(&reply) => {}
            Ok(reply) => error!(db = %db, "Error applying oplog entry: {}", error_message(&reply)),
            Err(e) => error!(db = %db, error = %e, "Error applying oplog entry"),
        }
        self.replay.record_applied();
        self.await_replication(&db, "Error while replaying oplog: ");
    }
}
