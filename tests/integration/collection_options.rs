//! Collection creation from metadata sidecars

use crate::integration::test_utils::{capture_logs, commands_named, restore, DumpTree};
use bson::{doc, Bson};
use bsonrestore::connection::MemoryConnection;
use bsonrestore::error::RestoreError;
use bsonrestore::filter::values_equal;

fn capped_dump() -> DumpTree {
    let dump = DumpTree::new();
    dump.data_file("app/log.bson", &[doc! { "_id": 1, "line": "boot" }])
        .text_file(
            "app/log.metadata.json",
            r#"{"options": {"create": "log_v1", "capped": true, "size": 4096}, "indexes": []}"#,
        );
    dump
}

#[test]
fn test_creates_collection_with_dumped_options() {
    let dump = capped_dump();
    let mut conn = MemoryConnection::new();
    let report = restore(&mut conn, dump.options()).unwrap();

    let creates = commands_named(&conn, "create");
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].get_str("create").unwrap(), "log");

    let options = conn.collection_options("app.log").unwrap();
    assert!(options.get_bool("capped").unwrap());
    assert!(values_equal(options.get("size").unwrap(), &Bson::Int32(4096)));
    assert_eq!(report.collections_created, 1);
    assert_eq!(conn.documents("app.log").len(), 1);
}

#[test]
fn test_existing_collection_keeps_its_options() {
    let dump = capped_dump();
    let mut conn = MemoryConnection::new().with_collection_options("app.log", doc! { "capped": false });

    let report = restore(&mut conn, dump.options()).unwrap();

    assert!(commands_named(&conn, "create").is_empty());
    assert_eq!(conn.collection_options("app.log"), Some(&doc! { "capped": false }));
    assert_eq!(report.collections_created, 0);
    assert_eq!(conn.documents("app.log").len(), 1);
}

#[test]
fn test_drop_recreates_with_dumped_options() {
    let dump = capped_dump();
    let mut options = dump.options();
    options.drop = true;
    let mut conn = MemoryConnection::new().with_collection_options("app.log", doc! { "capped": false });

    restore(&mut conn, options).unwrap();

    assert!(conn
        .collection_options("app.log")
        .unwrap()
        .get_bool("capped")
        .unwrap());
}

#[test]
fn test_create_failure_is_fatal() {
    let dump = capped_dump();
    let mut conn = MemoryConnection::new();
    conn.fail_command("create", "size must be positive");

    match restore(&mut conn, dump.options()) {
        Err(RestoreError::CollectionCreateFailed { ns, message }) => {
            assert_eq!(ns, "app.log");
            assert_eq!(message, "size must be positive");
        }
        other => panic!("expected create failure, got {:?}", other),
    }
    assert!(conn.documents("app.log").is_empty());
}

#[test]
fn test_no_options_restore_skips_create() {
    let dump = capped_dump();
    let mut options = dump.options();
    options.restore_options = false;

    let mut conn = MemoryConnection::new();
    restore(&mut conn, options).unwrap();

    assert!(commands_named(&conn, "create").is_empty());
    assert_eq!(conn.documents("app.log").len(), 1);
}

#[test]
fn test_malformed_metadata_is_fatal() {
    let dump = DumpTree::new();
    dump.data_file("app/items.bson", &[doc! { "_id": 1 }])
        .text_file("app/items.metadata.json", r#"{"options": {"capped": tru"#);

    let mut conn = MemoryConnection::new();
    assert!(matches!(
        restore(&mut conn, dump.options()),
        Err(RestoreError::Metadata { .. })
    ));
    assert!(conn.documents("app.items").is_empty());
}

#[test]
fn test_missing_metadata_is_not_an_error() {
    let dump = DumpTree::new();
    dump.data_file("app/items.bson", &[doc! { "_id": 1 }]);

    let mut conn = MemoryConnection::new();
    let report = restore(&mut conn, dump.options()).unwrap();

    assert!(commands_named(&conn, "create").is_empty());
    assert_eq!(report.documents_inserted, 1);
}

#[test]
fn test_missing_metadata_is_logged_as_warning() {
    let dump = DumpTree::new();
    dump.data_file("app/items.bson", &[doc! { "_id": 1 }]);

    let mut conn = MemoryConnection::new();
    let (report, logs) = capture_logs(|| restore(&mut conn, dump.options()));
    report.unwrap();

    let line = logs
        .lines()
        .find(|line| line.contains("items.metadata.json not found"))
        .expect("missing sidecar should be logged");
    assert!(line.contains("WARN"), "unexpected level: {}", line);
}

#[test]
fn test_missing_system_metadata_is_silent() {
    let dump = DumpTree::new();
    dump.data_file("app/system.js.bson", &[doc! { "_id": "f" }]);

    let mut conn = MemoryConnection::new();
    let (report, logs) = capture_logs(|| restore(&mut conn, dump.options()));
    report.unwrap();

    assert!(!logs.contains("metadata.json not found"), "{}", logs);
}
