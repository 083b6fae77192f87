//! Concurrent writers sharing one on-disk store

use std::sync::Arc;
use std::time::Duration;

use crate::common::TestDatabase;
use formstash::local_db::FormStore;
use formstash::shared::snapshot::fingerprint;
use formstash::shared::RecordKey;
use serde_json::json;

const TTL: Duration = Duration::from_secs(3600);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_on_distinct_keys_all_succeed() {
    let fixture = TestDatabase::new();
    let db = Arc::new(fixture.open().await);

    let mut tasks = Vec::new();
    for owner in 0..16 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            let key = RecordKey::new(owner.to_string(), "deal-edit");
            let mut failures = Vec::new();
            for revision in 0..20 {
                let payload = json!({"step": 1, "revision": revision});
                if let Err(e) = db.save(&key, &payload, TTL).await {
                    failures.push(e.to_string());
                }
            }
            failures
        }));
    }

    for task in tasks {
        let failures = task.await.unwrap();
        assert!(failures.is_empty(), "saves failed: {:?}", failures);
    }

    for owner in 0..16 {
        let key = RecordKey::new(owner.to_string(), "deal-edit");
        assert_eq!(
            db.load(&key).await.unwrap(),
            Some(json!({"step": 1, "revision": 19}))
        );
    }
    assert_eq!(db.stats().await.unwrap().live_records, 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mark_synced_racing_saves_never_fails() {
    let fixture = TestDatabase::new();
    let db = Arc::new(fixture.open().await);
    let key = RecordKey::new("42", "onboarding-individual");
    let first = json!({"step": 0});
    db.save(&key, &first, TTL).await.unwrap();

    let saver = {
        let db = db.clone();
        let key = key.clone();
        tokio::spawn(async move {
            for step in 1..=30 {
                db.save(&key, &json!({"step": step}), TTL).await.unwrap();
            }
        })
    };
    let confirmer = {
        let db = db.clone();
        let key = key.clone();
        let fp = fingerprint(&first);
        tokio::spawn(async move {
            for _ in 0..30 {
                db.mark_synced(&key, &fp).await.unwrap();
            }
        })
    };

    saver.await.unwrap();
    confirmer.await.unwrap();

    // The confirmed payload is stale by now.
    let record = db.record(&key).await.unwrap().unwrap();
    assert_eq!(record.payload, json!({"step": 30}));
    assert!(record.sync_pending);
}
