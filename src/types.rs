//! Shared restore types: scopes, namespaces, and the active namespace context.

use crate::error::ConnectionError;
use std::fmt;

/// Collection holding index definitions in legacy dumps and on legacy servers
pub const INDEX_COLLECTION: &str = "system.indexes";

/// Collection holding user records; it cannot be dropped
pub const USERS_COLLECTION: &str = "system.users";

/// Profiling collection; never restored
pub const PROFILE_FILE: &str = "system.profile.bson";

/// Legacy per-directory index definition file
pub const INDEX_FILE: &str = "system.indexes.bson";

/// Captured operation log file at the dump root
pub const OPLOG_FILE: &str = "oplog.bson";

/// Suffix of sidecar metadata files
pub const METADATA_SUFFIX: &str = ".metadata.json";

/// Database used when a data file has no parent directory name
pub const DEFAULT_DATABASE: &str = "test";

/// Target server's replication log
pub const SERVER_OPLOG_NAMESPACE: &str = "local.oplog.rs";

/// What part of the server a run restores. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreScope {
    /// Every database found in the dump tree
    Full,
    /// A single database; the dump root holds flat data files
    SingleDatabase(String),
    /// A single collection; the dump root holds exactly one data file
    SingleCollection { db: String, collection: String },
}

impl RestoreScope {
    pub fn from_overrides(db: Option<String>, collection: Option<String>) -> Option<Self> {
        match (db, collection) {
            (None, None) => Some(RestoreScope::Full),
            (Some(db), None) => Some(RestoreScope::SingleDatabase(db)),
            (Some(db), Some(collection)) => Some(RestoreScope::SingleCollection { db, collection }),
            (None, Some(_)) => None,
        }
    }

    /// Database name override, if any
    pub fn database(&self) -> Option<&str> {
        match self {
            RestoreScope::Full => None,
            RestoreScope::SingleDatabase(db) => Some(db),
            RestoreScope::SingleCollection { db, .. } => Some(db),
        }
    }

    /// Collection name override, if any
    pub fn collection(&self) -> Option<&str> {
        match self {
            RestoreScope::SingleCollection { collection, .. } => Some(collection),
            _ => None,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, RestoreScope::Full)
    }
}

/// A `database.collection` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub db: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
        }
    }

    /// Split a full namespace at its first `.`
    pub fn parse(ns: &str) -> Result<Self, ConnectionError> {
        match ns.split_once('.') {
            Some((db, collection)) if !db.is_empty() && !collection.is_empty() => {
                Ok(Self::new(db, collection))
            }
            _ => Err(ConnectionError::InvalidNamespace(ns.to_string())),
        }
    }

    /// The index collection of this namespace's database
    pub fn index_namespace(&self) -> Namespace {
        Namespace::new(self.db.clone(), INDEX_COLLECTION)
    }

    pub fn is_users(&self) -> bool {
        self.collection == USERS_COLLECTION
    }

    pub fn is_index_collection(&self) -> bool {
        self.collection == INDEX_COLLECTION
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.collection)
    }
}

/// Database name prefix of a full namespace string
pub fn database_of(ns: &str) -> &str {
    ns.split('.').next().unwrap_or(ns)
}

/// The stream the dispatcher is currently consuming
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceContext {
    /// Documents of one collection dump file
    Collection(Namespace),
    /// Entries of the captured operation log
    OplogReplay,
}

impl fmt::Display for NamespaceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceContext::Collection(ns) => ns.fmt(f),
            NamespaceContext::OplogReplay => f.write_str("$oplog"),
        }
    }
}
