//! Error types for the bsonrestore restore engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a database connection collaborator
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {uri}: {message}")]
    Connect { uri: String, message: String },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<mongodb::error::Error> for ConnectionError {
    fn from(err: mongodb::error::Error) -> Self {
        ConnectionError::Driver(err.to_string())
    }
}

/// Errors raised while reading a stream of serialized documents
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Document stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Truncated document: declared {declared} bytes, stream ended after {read}")]
    Truncated { declared: usize, read: usize },

    #[error("Invalid document length prefix: {0}")]
    InvalidLength(i32),

    #[error("Failed to decode document: {0}")]
    Decode(#[from] bson::de::Error),
}

/// Errors decoding Extended JSON text into one document
#[derive(Debug, Error)]
pub enum JsonDocumentError {
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not valid Extended JSON: {0}")]
    ExtendedJson(String),

    #[error("expected a JSON object at the top level, found {0:?}")]
    NotAnObject(bson::spec::ElementType),
}

/// Errors raised while reading a sidecar metadata file
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to read metadata file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metadata is not valid Extended JSON: {0}")]
    ExtendedJson(String),

    #[error("Unexpected metadata shape: {0}")]
    Shape(String),
}

impl From<JsonDocumentError> for MetadataError {
    fn from(err: JsonDocumentError) -> Self {
        match err {
            JsonDocumentError::Json(e) => MetadataError::Json(e),
            JsonDocumentError::ExtendedJson(message) => MetadataError::ExtendedJson(message),
            shape @ JsonDocumentError::NotAnObject(_) => MetadataError::Shape(shape.to_string()),
        }
    }
}

/// Top-level restore errors. Every variant terminates the run.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("Target server is not a writable primary")]
    NotWritable,

    #[error("Cannot do a full restore on a sharded system")]
    ShardedFullRestore,

    #[error("Can only replay oplog on full restore")]
    OplogRequiresFullRestore,

    #[error("No oplog file to replay at {0}. Make sure the dump was taken with --oplog.")]
    OplogFileMissing(PathBuf),

    #[error("buildinfo command failed: {0}")]
    BuildInfoFailed(String),

    #[error("Can only replay oplog to server version >= 1.7.4 (server is {0})")]
    UnsupportedServerVersion(String),

    #[error("Could not parse oplogLimit into Timestamp from value '{0}'")]
    InvalidOplogLimit(String),

    #[error("The oplogLimit {limit} is not newer than the last oplog entry on the server ({latest})")]
    OplogLimitNotNewer { latest: String, limit: String },

    #[error("The oplogLimit option cannot be used if normal databases/collections exist in the dump directory (found {0})")]
    OplogLimitWithCollections(PathBuf),

    #[error("root directory must be a dump of a single {expected} when specifying --{flag} ({path})")]
    ScopeViolation {
        expected: &'static str,
        flag: &'static str,
        path: PathBuf,
    },

    #[error("Creating collection {ns} failed. Errmsg: {message}")]
    CollectionCreateFailed { ns: String, message: String },

    #[error("Error creating index {ns}: {code} {message}")]
    IndexBuildFailed {
        ns: String,
        code: String,
        message: String,
    },

    #[error("Error calling getLastError: {0}")]
    AcknowledgementFailed(String),

    #[error("Failed to load metadata {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },

    #[error("Failed to read {path:?}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("Document received outside of any collection or oplog replay")]
    NoActiveNamespace,

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for RestoreError {
    fn from(err: config::ConfigError) -> Self {
        RestoreError::ConfigError(err.to_string())
    }
}
