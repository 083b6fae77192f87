//! Drafts surviving a reload
//!
//! Each test writes through one `LocalDatabase`, closes it, and reads the
//! same file back through a fresh one, the way a reloaded page or a
//! restarted app would.

use std::sync::Arc;
use std::time::Duration;

use crate::common::TestDatabase;
use formstash::local_db::FormStore;
use formstash::offline::{FormSnapshot, OfflineForm, RecoveryState};
use formstash::shared::{FormConfig, ManualClock, RecordKey};
use formstash::sync::NetworkMonitor;
use pretty_assertions::assert_eq;
use serde_json::json;

fn onboarding_config() -> FormConfig {
    FormConfig::builder("onboarding-individual", "42")
        .auto_save(false)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_onboarding_draft_survives_reload() {
    let fixture = TestDatabase::new();
    let payload = json!({"step": 2, "preferences": {"categories": ["food"]}});

    {
        let db = Arc::new(fixture.open().await);
        let form = OfflineForm::open(
            onboarding_config(),
            FormSnapshot::default(),
            db.clone(),
            NetworkMonitor::default(),
        )
        .await
        .unwrap();

        form.set_step(2).unwrap();
        form.set_field("preferences", json!({"categories": ["food"]})).unwrap();
        assert_eq!(form.snapshot(), payload);
        crate::assert_ok!(form.save().await);
        form.close();
        db.close().await;
    }

    // Reload
    let db = Arc::new(fixture.open().await);
    let form = OfflineForm::open(
        onboarding_config(),
        FormSnapshot::default(),
        db,
        NetworkMonitor::default(),
    )
    .await
    .unwrap();

    assert!(form.recovery_state().is_pending_decision());
    assert!(form.check_for_saved_data().await.unwrap());
    // Nothing applied until the user chooses.
    assert_eq!(form.step(), 0);

    let restored = form.restore().await.unwrap();
    assert_eq!(restored, Some(payload.clone()));
    assert_eq!(form.snapshot(), payload);
    assert!(!form.is_dirty());
    assert_eq!(form.recovery_state(), RecoveryState::Restored);

    let meta = form.metadata();
    assert!(meta.has_persisted_data);
    assert!(meta.sync_pending);
    assert!(!meta.is_dirty);
}

#[tokio::test]
async fn test_ttl_boundary_on_disk() {
    let fixture = TestDatabase::new();
    let clock = Arc::new(ManualClock::default());
    let key = RecordKey::new("42", "onboarding-individual");
    let payload = json!({"step": 1});

    let db = fixture.open_with_clock(clock.clone()).await;
    db.save(&key, &payload, Duration::from_millis(1000)).await.unwrap();
    db.close().await;

    let db = fixture.open_with_clock(clock.clone()).await;
    clock.advance(Duration::from_millis(999));
    assert_eq!(db.load(&key).await.unwrap(), Some(payload));

    clock.advance(Duration::from_millis(2));
    assert_eq!(db.load(&key).await.unwrap(), None);
    assert!(!db.exists(&key).await.unwrap());
    // The lazy delete already removed the row.
    assert_eq!(db.stats().await.unwrap().expired_records, 0);
}

#[tokio::test]
async fn test_last_writer_wins_across_sessions() {
    let fixture = TestDatabase::new();
    let key = RecordKey::new("42", "deal-edit");

    let db = fixture.open().await;
    db.save(&key, &json!({"title": "A"}), Duration::from_secs(60)).await.unwrap();
    db.save(&key, &json!({"title": "B"}), Duration::from_secs(60)).await.unwrap();
    db.close().await;

    let db = fixture.open().await;
    assert_eq!(db.load(&key).await.unwrap(), Some(json!({"title": "B"})));
}

#[tokio::test]
async fn test_overlapping_saves_apply_in_issue_order() {
    let fixture = TestDatabase::new();
    let db = Arc::new(fixture.open().await);
    let config = FormConfig::builder("deal-edit", "42").auto_save(false).build().unwrap();
    let form = OfflineForm::open(config, FormSnapshot::default(), db.clone(), NetworkMonitor::default())
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        async {
            form.set_field("title", json!("A")).unwrap();
            form.save().await
        },
        async {
            tokio::task::yield_now().await;
            form.set_field("title", json!("B")).unwrap();
            form.save().await
        }
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(
        db.load(form.key()).await.unwrap(),
        Some(json!({"step": 0, "title": "B"}))
    );
    assert!(!form.is_dirty());
}
