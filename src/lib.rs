//! bsonrestore: restore a BSON dump tree into a live server
//!
//! Walks a dump directory, recreates each collection with its recorded
//! options, streams its documents back in file order, rebuilds its indexes,
//! and optionally replays a captured operation log up to a point in time.

pub mod cli;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod filter;
pub mod logging;
pub mod restore;
pub mod types;
