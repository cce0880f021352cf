//! Namespace resolution and dump-shape validation across whole restores

use crate::integration::test_utils::{inserted_namespaces, restore, DumpTree};
use bson::doc;
use bsonrestore::connection::memory::Operation;
use bsonrestore::connection::MemoryConnection;
use bsonrestore::error::RestoreError;
use bsonrestore::types::RestoreScope;

fn items_dump() -> DumpTree {
    let dump = DumpTree::new();
    dump.data_file("mydb/items.bson", &[doc! { "_id": 1 }, doc! { "_id": 2 }]);
    dump
}

#[test]
fn test_full_restore_uses_directory_and_file_names() {
    let dump = items_dump();
    let mut conn = MemoryConnection::new();
    let report = restore(&mut conn, dump.options()).unwrap();

    assert_eq!(conn.documents("mydb.items").len(), 2);
    assert_eq!(report.files_restored, 1);
    assert_eq!(report.documents_inserted, 2);
    assert!(report.finished_at.is_some());
}

#[test]
fn test_database_override_renames_database() {
    let dump = items_dump();
    let mut options = dump.options_at("mydb");
    options.scope = RestoreScope::SingleDatabase("other".to_string());

    let mut conn = MemoryConnection::new();
    restore(&mut conn, options).unwrap();

    assert_eq!(conn.documents("other.items").len(), 2);
    assert!(conn.documents("mydb.items").is_empty());
}

#[test]
fn test_collection_override_ignores_file_name() {
    let dump = items_dump();
    let scope = RestoreScope::SingleCollection {
        db: "other".to_string(),
        collection: "stuff".to_string(),
    };

    let mut options = dump.options_at("mydb");
    options.scope = scope.clone();
    let mut conn = MemoryConnection::new();
    restore(&mut conn, options).unwrap();
    assert_eq!(conn.documents("other.stuff").len(), 2);

    let mut options = dump.options_at("mydb/items.bson");
    options.scope = scope;
    let mut conn = MemoryConnection::new();
    restore(&mut conn, options).unwrap();
    assert_eq!(conn.documents("other.stuff").len(), 2);
}

#[test]
fn test_database_scope_rejects_nested_directories_before_writing() {
    let dump = DumpTree::new();
    dump.data_file("items.bson", &[doc! { "_id": 1 }])
        .data_file("nested/more.bson", &[doc! { "_id": 2 }]);

    let mut options = dump.options();
    options.scope = RestoreScope::SingleDatabase("app".to_string());
    let mut conn = MemoryConnection::new();
    let result = restore(&mut conn, options);

    assert!(matches!(
        result,
        Err(RestoreError::ScopeViolation { flag: "db", .. })
    ));
    assert!(inserted_namespaces(&conn).is_empty());
}

#[test]
fn test_collection_scope_requires_exactly_one_data_file() {
    let dump = DumpTree::new();
    dump.data_file("items.bson", &[doc! { "_id": 1 }])
        .data_file("other.bson", &[doc! { "_id": 2 }]);

    let mut options = dump.options();
    options.scope = RestoreScope::SingleCollection {
        db: "app".to_string(),
        collection: "items".to_string(),
    };
    let mut conn = MemoryConnection::new();
    let result = restore(&mut conn, options);

    assert!(matches!(
        result,
        Err(RestoreError::ScopeViolation { flag: "collection", .. })
    ));
    assert!(inserted_namespaces(&conn).is_empty());
}

#[test]
fn test_collection_scope_ignores_metadata_sidecar() {
    let dump = DumpTree::new();
    dump.data_file("items.bson", &[doc! { "_id": 1 }])
        .text_file("items.metadata.json", r#"{"indexes": []}"#);

    let mut options = dump.options();
    options.scope = RestoreScope::SingleCollection {
        db: "app".to_string(),
        collection: "renamed".to_string(),
    };
    let mut conn = MemoryConnection::new();
    restore(&mut conn, options).unwrap();
    assert_eq!(conn.documents("app.renamed").len(), 1);
}

#[test]
fn test_skips_hidden_profile_and_unknown_files() {
    let dump = DumpTree::new();
    dump.data_file("app/items.bson", &[doc! { "_id": 1 }])
        .data_file("app/.items.bson", &[doc! { "_id": 2 }])
        .data_file(".trash/app/old.bson", &[doc! { "_id": 3 }])
        .data_file("app/system.profile.bson", &[doc! { "op": "query" }])
        .text_file("app/README.txt", "not a dump file");

    let mut conn = MemoryConnection::new();
    let report = restore(&mut conn, dump.options()).unwrap();

    assert_eq!(inserted_namespaces(&conn), vec!["app.items".to_string()]);
    assert_eq!(report.files_restored, 1);
}

#[test]
fn test_top_level_oplog_is_not_a_collection() {
    let dump = DumpTree::new();
    dump.data_file("app/items.bson", &[doc! { "_id": 1 }])
        .data_file("oplog.bson", &[doc! { "op": "n", "ns": "", "o": {} }]);

    let mut conn = MemoryConnection::new();
    restore(&mut conn, dump.options()).unwrap();

    assert_eq!(inserted_namespaces(&conn), vec!["app.items".to_string()]);
}

#[test]
fn test_existing_collection_without_drop_still_inserts() {
    let dump = items_dump();
    let mut conn = MemoryConnection::new().with_collection("mydb.items", vec![doc! { "_id": 0 }]);

    restore(&mut conn, dump.options()).unwrap();

    assert_eq!(conn.documents("mydb.items").len(), 3);
    assert!(!conn
        .journal()
        .iter()
        .any(|op| matches!(op, Operation::Drop { .. })));
}

#[test]
fn test_drop_replaces_existing_collection() {
    let dump = items_dump();
    let mut options = dump.options();
    options.drop = true;
    let mut conn = MemoryConnection::new().with_collection("mydb.items", vec![doc! { "_id": 0 }]);

    restore(&mut conn, options).unwrap();

    assert_eq!(conn.documents("mydb.items"), &[doc! { "_id": 1 }, doc! { "_id": 2 }]);
    assert!(conn.journal().contains(&Operation::Drop {
        ns: "mydb.items".to_string()
    }));
}

#[test]
fn test_document_filter_skips_non_matching() {
    let dump = DumpTree::new();
    dump.data_file(
        "shop/items.bson",
        &[
            doc! { "_id": 1, "kind": "book", "price": 12 },
            doc! { "_id": 2, "kind": "film", "price": 8 },
            doc! { "_id": 3, "kind": "book", "price": 30 },
        ],
    );
    let mut options = dump.options();
    options.filter = Some(doc! { "kind": "book", "price": { "$lt": 20 } });

    let mut conn = MemoryConnection::new();
    let report = restore(&mut conn, options).unwrap();

    assert_eq!(conn.documents("shop.items"), &[doc! { "_id": 1, "kind": "book", "price": 12 }]);
    assert_eq!(report.documents_filtered, 2);
}

#[test]
fn test_preflight_failures_stop_before_walking() {
    let dump = items_dump();
    let mut conn = MemoryConnection::new();
    conn.set_writable(false);

    assert!(matches!(
        restore(&mut conn, dump.options()),
        Err(RestoreError::NotWritable)
    ));
    assert!(inserted_namespaces(&conn).is_empty());
}

#[test]
fn test_sharded_router_allows_single_database_restore() {
    let dump = DumpTree::new();
    dump.data_file("config/settings.bson", &[doc! { "_id": "balancer" }])
        .data_file("app/items.bson", &[doc! { "_id": 1 }]);
    let mut conn = MemoryConnection::new();
    conn.set_sharded(true);

    assert!(matches!(
        restore(&mut conn, dump.options()),
        Err(RestoreError::ShardedFullRestore)
    ));

    let mut options = dump.options_at("app");
    options.scope = RestoreScope::SingleDatabase("app".to_string());
    restore(&mut conn, options).unwrap();
    assert_eq!(conn.documents("app.items").len(), 1);
}
