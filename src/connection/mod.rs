//! Database connection boundary
//!
//! The restore engine talks to the target server only through [`Connection`].
//! Calls are synchronous: every method blocks until the server answers, which
//! keeps the walk, the document stream, and the replication waits strictly
//! ordered.

pub mod memory;
pub mod mongo;

pub use memory::MemoryConnection;
pub use mongo::MongoConnection;

use crate::error::ConnectionError;
use crate::filter::truthy;
use crate::types::Namespace;
use bson::{Bson, Document};

/// Options for [`Connection::query`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub limit: Option<i64>,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
}

impl QueryOptions {
    pub fn projection(fields: Document) -> Self {
        Self {
            projection: Some(fields),
            ..Self::default()
        }
    }

    /// Newest document first in natural (insertion) order
    pub fn newest_first(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            sort: Some(bson::doc! { "$natural": -1 }),
            ..Self::default()
        }
    }
}

/// Operations the restore engine needs from the target server
pub trait Connection {
    fn query(
        &mut self,
        ns: &Namespace,
        filter: Document,
        options: QueryOptions,
    ) -> Result<Vec<Document>, ConnectionError>;

    /// Insert one document. Server-side write failures surface through the
    /// next last-error query, not through this result.
    fn insert(&mut self, ns: &Namespace, doc: &Document) -> Result<(), ConnectionError>;

    /// Replace the first document matching `filter`
    fn update(
        &mut self,
        ns: &Namespace,
        filter: Document,
        replacement: &Document,
    ) -> Result<(), ConnectionError>;

    fn remove(&mut self, ns: &Namespace, filter: Document) -> Result<(), ConnectionError>;

    /// Run a database command. A command the server rejects is still `Ok`,
    /// with `ok: 0` and an `errmsg` in the reply.
    fn run_command(&mut self, db: &str, command: Document) -> Result<Document, ConnectionError>;

    /// Error of the previous write on this connection, waiting for `w`
    /// replicas when `w` is positive
    fn get_last_error(&mut self, db: &str, w: u32) -> Result<Option<String>, ConnectionError>;

    /// Full last-error reply (`ok`, `err`, `code`, ...)
    fn get_last_error_detailed(&mut self, db: &str, w: u32) -> Result<Document, ConnectionError>;

    fn is_primary_writable(&mut self) -> Result<bool, ConnectionError>;

    fn is_sharded_router(&mut self) -> Result<bool, ConnectionError>;

    fn drop_collection(&mut self, ns: &Namespace) -> Result<(), ConnectionError>;

    /// Creation options recorded by the server, or `None` if the collection
    /// does not exist
    fn find_collection(&mut self, ns: &Namespace) -> Result<Option<Document>, ConnectionError>;
}

/// Whether a command reply reports success
pub fn command_succeeded(reply: &Document) -> bool {
    reply.get("ok").is_some_and(truthy)
}

/// Human-readable error from a command reply
pub fn error_message(reply: &Document) -> String {
    match reply.get("errmsg").or_else(|| reply.get("err")) {
        Some(Bson::String(msg)) => msg.clone(),
        Some(other) => other.to_string(),
        None => "unknown error".to_string(),
    }
}
