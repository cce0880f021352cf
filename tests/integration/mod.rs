//! Integration tests for bsonrestore

mod collection_options;
mod config_integration;
mod restore_scope;
mod test_utils;
mod user_merge;
