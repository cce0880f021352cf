//! Index definition rewriting is stable under repetition

use bson::{doc, Document};
use bsonrestore::restore::rewrite_index_definition;
use bsonrestore::types::Namespace;
use proptest::prelude::*;

fn definition(field: &str, name: &str, ns: Option<&str>, version: i32) -> Document {
    let mut key = Document::new();
    key.insert(field, 1);
    let mut def = doc! { "v": version, "key": key, "name": name };
    if let Some(ns) = ns {
        def.insert("ns", ns);
    }
    def
}

/// Rewriting an already rewritten definition changes nothing
#[test]
fn test_rewrite_idempotence_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                "[a-z]{1,8}",
                "[a-z]{1,8}(\\.[a-z]{1,5})?",
                proptest::option::of("[a-z]{1,6}\\.[a-z]{1,6}(\\.[a-z]{1,4})?"),
                "[a-z]{1,6}",
                any::<bool>(),
                any::<bool>(),
                0i32..3,
            ),
            |(db, collection, ns, field, keep_name, keep_version, version)| {
                let target = Namespace::new(db.clone(), collection);
                let def = definition(&field, &format!("{}_1", field), ns.as_deref(), version);

                let once = rewrite_index_definition(&def, &target, keep_name, keep_version);
                let twice = rewrite_index_definition(&once, &target, keep_name, keep_version);
                prop_assert_eq!(&once, &twice);

                if let Ok(rewritten_ns) = once.get_str("ns") {
                    let prefix = format!("{}.", db);
                    prop_assert!(rewritten_ns.starts_with(&prefix));
                }
                prop_assert_eq!(once.contains_key("v"), keep_version);
                prop_assert_eq!(once.get_document("key").ok(), def.get_document("key").ok());

                Ok(())
            },
        )
        .unwrap();
}

/// Without keeping the collection name, every definition lands on the target
#[test]
fn test_rewrite_targets_collection_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                "[a-z]{1,8}",
                "[a-z]{1,8}",
                proptest::option::of("[a-z]{1,6}\\.[a-z]{1,6}"),
            ),
            |(db, collection, ns)| {
                let target = Namespace::new(db, collection);
                let def = definition("a", "a_1", ns.as_deref(), 1);
                let rewritten = rewrite_index_definition(&def, &target, false, false);
                let expected = target.to_string();
                prop_assert_eq!(rewritten.get_str("ns").ok(), Some(expected.as_str()));
                Ok(())
            },
        )
        .unwrap();
}
