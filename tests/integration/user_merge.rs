//! Users collection merge under drop mode

use crate::integration::test_utils::{restore, DumpTree};
use bson::{doc, Document};
use bsonrestore::connection::memory::Operation;
use bsonrestore::connection::MemoryConnection;

fn user(name: &str, pwd: &str) -> Document {
    doc! { "user": name, "pwd": pwd }
}

fn existing_users() -> MemoryConnection {
    MemoryConnection::new().with_collection(
        "admin.system.users",
        vec![user("alice", "old"), user("bob", "old"), user("carol", "old")],
    )
}

fn users_dump() -> DumpTree {
    let dump = DumpTree::new();
    dump.data_file(
        "admin/system.users.bson",
        &[user("alice", "new"), user("dave", "new")],
    );
    dump
}

#[test]
fn test_drop_merges_users_in_place() {
    let dump = users_dump();
    let mut options = dump.options();
    options.drop = true;

    let mut conn = existing_users();
    let report = restore(&mut conn, options).unwrap();

    assert_eq!(
        conn.documents("admin.system.users"),
        &[user("alice", "new"), user("dave", "new")]
    );
    assert_eq!(report.documents_updated, 1);
    assert_eq!(report.documents_inserted, 1);
    assert_eq!(report.users_removed, 2);
}

#[test]
fn test_users_collection_is_never_dropped() {
    let dump = users_dump();
    let mut options = dump.options();
    options.drop = true;

    let mut conn = existing_users();
    restore(&mut conn, options).unwrap();

    assert!(!conn
        .journal()
        .iter()
        .any(|op| matches!(op, Operation::Drop { ns } if ns == "admin.system.users")));

    let removed: Vec<&Document> = conn
        .journal()
        .iter()
        .filter_map(|op| match op {
            Operation::Remove { filter, .. } => Some(filter),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec![&doc! { "user": "bob" }, &doc! { "user": "carol" }]);
}

#[test]
fn test_removal_happens_after_stream() {
    let dump = users_dump();
    let mut options = dump.options();
    options.drop = true;

    let mut conn = existing_users();
    restore(&mut conn, options).unwrap();

    let journal = conn.journal();
    let last_write = journal
        .iter()
        .rposition(|op| matches!(op, Operation::Insert { .. } | Operation::Update { .. }))
        .unwrap();
    let first_remove = journal
        .iter()
        .position(|op| matches!(op, Operation::Remove { .. }))
        .unwrap();
    assert!(last_write < first_remove);
}

#[test]
fn test_without_drop_users_are_inserted() {
    let dump = users_dump();
    let mut conn = existing_users();
    let report = restore(&mut conn, dump.options()).unwrap();

    assert_eq!(conn.documents("admin.system.users").len(), 5);
    assert_eq!(report.documents_updated, 0);
    assert_eq!(report.users_removed, 0);
}

#[test]
fn test_user_records_without_names_are_inserted() {
    let dump = DumpTree::new();
    dump.data_file("admin/system.users.bson", &[doc! { "role": "orphan" }]);
    let mut options = dump.options();
    options.drop = true;

    let mut conn = existing_users();
    let report = restore(&mut conn, options).unwrap();

    assert_eq!(report.documents_inserted, 1);
    assert_eq!(report.users_removed, 3);
    assert_eq!(conn.documents("admin.system.users"), &[doc! { "role": "orphan" }]);
}

#[test]
fn test_user_update_waits_for_replicas() {
    let dump = DumpTree::new();
    dump.data_file("admin/system.users.bson", &[user("alice", "new")]);
    let mut options = dump.options();
    options.drop = true;
    options.write_concern = 2;

    let mut conn = MemoryConnection::new()
        .with_collection("admin.system.users", vec![user("alice", "old")]);
    let report = restore(&mut conn, options).unwrap();

    assert_eq!(report.documents_updated, 1);
    let journal = conn.journal();
    let update = journal
        .iter()
        .position(|op| matches!(op, Operation::Update { .. }))
        .unwrap();
    assert_eq!(
        journal[update + 1],
        Operation::LastError {
            db: "admin".to_string(),
            w: 2
        }
    );
}

#[test]
fn test_user_removal_does_not_query_last_error() {
    let dump = users_dump();
    let mut options = dump.options();
    options.drop = true;

    let mut conn = existing_users();
    let report = restore(&mut conn, options).unwrap();
    assert_eq!(report.users_removed, 2);

    let journal = conn.journal();
    assert_eq!(
        journal
            .iter()
            .filter(|op| matches!(op, Operation::Remove { .. }))
            .count(),
        2
    );
    assert_eq!(
        journal.last(),
        Some(&Operation::LastError {
            db: "admin".to_string(),
            w: 0
        })
    );

    let last_error_queries = journal
        .iter()
        .filter(|op| matches!(op, Operation::LastError { .. }))
        .count();
    assert_eq!(last_error_queries, 1, "only the end-of-walk check should run");
}
