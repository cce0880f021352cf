//! Replay window admission counts

use bson::{doc, Document, Timestamp};
use bsonrestore::restore::{Admission, OpTime, OplogReplay, ReplayWindow};
use proptest::prelude::*;

fn entry(noop: bool, secs: u32) -> Document {
    let op = if noop { "n" } else { "i" };
    doc! {
        "ts": Timestamp { time: secs, increment: 1 },
        "op": op,
        "ns": "app.items",
        "o": { "_id": i64::from(secs) },
    }
}

/// Applied plus skipped equals the non-no-op entries, and only entries
/// strictly inside the window are applied
#[test]
fn test_window_counting_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                proptest::collection::vec((any::<bool>(), 0u32..1000), 0..60),
                proptest::option::of(0u32..1000),
                0u32..1000,
            ),
            |(entries, latest, limit)| {
                let after = latest.map(|secs| OpTime::new(secs, 0));
                let window = match ReplayWindow::new(after, OpTime::new(limit, 0)) {
                    Ok(window) => window,
                    Err(_) => {
                        prop_assert!(latest.is_some_and(|l| l >= limit));
                        return Ok(());
                    }
                };

                let mut replay = OplogReplay::default();
                replay.configure(Some(window), None).unwrap();
                replay.begin();

                let mut expected_applied = 0u64;
                for (noop, secs) in &entries {
                    let admitted = replay.admit(&entry(*noop, *secs));
                    if *noop {
                        prop_assert_eq!(admitted, Admission::NoOp);
                        continue;
                    }
                    let inside = latest.map_or(true, |l| *secs >= l) && *secs < limit;
                    if inside {
                        prop_assert_eq!(admitted, Admission::Apply);
                        replay.record_applied();
                        expected_applied += 1;
                    } else {
                        prop_assert_eq!(admitted, Admission::Skipped);
                    }
                }

                let counters = replay.finish();
                let non_noop = entries.iter().filter(|(noop, _)| !noop).count() as u64;
                prop_assert_eq!(counters.applied, expected_applied);
                prop_assert_eq!(counters.total(), non_noop);
                Ok(())
            },
        )
        .unwrap();
}
