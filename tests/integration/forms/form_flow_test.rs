//! `OfflineForm` end to end: recovery, discard, clear, submit

use std::sync::Arc;
use std::time::Duration;

use crate::common::RecordingEndpoint;
use formstash::local_db::{FormStore, MemoryStore};
use formstash::offline::{FormRegistry, FormSnapshot, RecoveryState};
use formstash::shared::{FormConfig, FormError, RecordKey};
use formstash::sync::{NetworkMonitor, NetworkStatus};
use pretty_assertions::assert_eq;
use serde_json::{json, Map};

fn key() -> RecordKey {
    RecordKey::new("42", "onboarding-individual")
}

fn config() -> FormConfig {
    FormConfig::builder("onboarding-individual", "42")
        .auto_save(false)
        .sync_endpoint("http://sync.test/forms")
        .build()
        .unwrap()
}

fn defaults() -> FormSnapshot {
    let mut values = Map::new();
    values.insert("preferences".to_string(), json!({"categories": []}));
    FormSnapshot::new(0, values)
}

async fn registry_with_draft(draft: serde_json::Value) -> (FormRegistry, Arc<MemoryStore>, Arc<RecordingEndpoint>) {
    let store = Arc::new(MemoryStore::new());
    store.save(&key(), &draft, Duration::from_secs(3600)).await.unwrap();
    let endpoint = RecordingEndpoint::new();
    let registry = FormRegistry::new(store.clone(), NetworkMonitor::default()).with_endpoint(endpoint.clone());
    (registry, store, endpoint)
}

#[tokio::test]
async fn test_discard_clears_state() {
    let (registry, store, _) = registry_with_draft(json!({"step": 3, "preferences": {"categories": ["food"]}})).await;
    let form = registry.open(config(), defaults()).await.unwrap();
    assert!(form.recovery_state().is_pending_decision());

    form.discard().await.unwrap();

    assert_eq!(form.recovery_state(), RecoveryState::Discarded);
    assert!(!store.exists(&key()).await.unwrap());
    assert!(!form.check_for_saved_data().await.unwrap());
    assert_eq!(form.snapshot(), defaults().to_value());
    assert!(!form.metadata().has_persisted_data);
}

#[tokio::test]
async fn test_restore_never_mixes_with_defaults() {
    let (registry, _, _) = registry_with_draft(json!({"step": 1, "company": "Taco Hut"})).await;
    let form = registry.open(config(), defaults()).await.unwrap();

    form.restore().await.unwrap();
    // The default `preferences` field is gone, not merged in.
    assert_eq!(form.snapshot(), json!({"step": 1, "company": "Taco Hut"}));
}

#[tokio::test]
async fn test_restore_callback_failure_leaves_form_untouched() {
    let (registry, _, _) = registry_with_draft(json!({"step": 1})).await;
    let form = registry.open(config(), defaults()).await.unwrap();
    form.set_field("draft_note", json!("typed before choosing")).unwrap();

    let result = form
        .restore_with(|_| Err(FormError::serialization("payload from an old form version")))
        .await;
    crate::assert_err!(result, FormError::Serialization { .. });
    assert_eq!(form.field("draft_note"), Some(json!("typed before choosing")));
    assert!(form.recovery_state().is_pending_decision());

    // The user can still resume.
    let mut applied = None;
    form.restore_with(|payload| {
        applied = Some(payload.clone());
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(applied, Some(json!({"step": 1})));
    assert_eq!(form.field("draft_note"), None);
}

#[tokio::test]
async fn test_clear_removes_synced_and_unsynced_state() {
    let (registry, store, _) = registry_with_draft(json!({"step": 1})).await;
    let form = registry.open(config(), defaults()).await.unwrap();
    form.restore().await.unwrap();
    form.set_step(4).unwrap();
    form.save().await.unwrap();

    form.clear().await.unwrap();
    assert!(!store.exists(&key()).await.unwrap());
    assert_eq!(form.step(), 0);
    assert!(!form.is_dirty());
    assert_eq!(form.metadata().last_saved, None);
}

#[tokio::test]
async fn test_idempotent_save_keeps_single_pending_flag() {
    let (registry, store, endpoint) = registry_with_draft(json!({"step": 0, "preferences": {"categories": []}})).await;
    let form = registry.open(config(), defaults()).await.unwrap();
    form.restore().await.unwrap();
    form.sync().await.unwrap();
    assert_eq!(endpoint.calls(), 1);

    // Saving what the server already has does not make it pending again.
    store
        .save(&key(), &json!({"preferences": {"categories": []}, "step": 0}), Duration::from_secs(60))
        .await
        .unwrap();
    assert!(!store.record(&key()).await.unwrap().unwrap().sync_pending);
}

#[tokio::test]
async fn test_submit_is_blocking_point_when_offline() {
    let store = Arc::new(MemoryStore::new());
    let endpoint = RecordingEndpoint::new();
    let network = NetworkMonitor::new(NetworkStatus::Offline);
    let registry = FormRegistry::new(store.clone(), network.clone()).with_endpoint(endpoint.clone());
    let config = FormConfig::builder("onboarding-individual", "42")
        .auto_save(false)
        .sync_endpoint("http://sync.test/forms")
        .auto_sync_on_reconnect(false)
        .build()
        .unwrap();
    let form = registry.open(config, defaults()).await.unwrap();
    form.set_field("company", json!("Taco Hut")).unwrap();

    crate::assert_err!(form.submit().await, FormError::Offline);
    assert_eq!(endpoint.calls(), 0);

    // Editing continues while the submission waits.
    form.set_step(1).unwrap();
    network.set_online(true);
    form.submit().await.unwrap();

    assert_eq!(
        endpoint.pushed().last(),
        Some(&json!({"step": 1, "company": "Taco Hut", "preferences": {"categories": []}}))
    );
    assert!(!store.exists(&key()).await.unwrap());
}

#[tokio::test]
async fn test_rejected_submit_keeps_draft() {
    let store = Arc::new(MemoryStore::new());
    let endpoint = RecordingEndpoint::new();
    endpoint.reject_with(Some(409));
    let registry = FormRegistry::new(store.clone(), NetworkMonitor::default()).with_endpoint(endpoint.clone());
    let form = registry.open(config(), defaults()).await.unwrap();
    form.set_step(2).unwrap();

    crate::assert_err!(form.submit().await, FormError::SyncRejected { status: 409, .. });
    assert!(store.exists(&key()).await.unwrap());
    assert!(form.metadata().has_persisted_data);
}

#[tokio::test(start_paused = true)]
async fn test_autosave_then_manual_save_resets_timer() {
    let store = Arc::new(MemoryStore::new());
    let registry = FormRegistry::new(store.clone(), NetworkMonitor::default());
    let config = FormConfig::builder("deal-edit", "42")
        .auto_save_interval(Duration::from_secs(20))
        .build()
        .unwrap();
    let form = registry.open(config, FormSnapshot::default()).await.unwrap();
    let key = form.key().clone();

    form.set_field("title", json!("Tacos")).unwrap();
    tokio::time::sleep(Duration::from_secs(21)).await;
    crate::wait_until!(!form.is_dirty());
    assert_eq!(store.load(&key).await.unwrap(), Some(json!({"step": 0, "title": "Tacos"})));

    // Manual save at t=30 pushes the next tick to t=50.
    tokio::time::sleep(Duration::from_secs(9)).await;
    form.set_field("title", json!("Burritos")).unwrap();
    form.save().await.unwrap();
    form.set_field("title", json!("Nachos")).unwrap();

    tokio::time::sleep(Duration::from_secs(15)).await;
    tokio::task::yield_now().await;
    assert!(form.is_dirty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    crate::wait_until!(!form.is_dirty());
    assert_eq!(store.load(&key).await.unwrap(), Some(json!({"step": 0, "title": "Nachos"})));

    registry.close("deal-edit");
}

#[tokio::test]
async fn test_draft_saved_after_mount_is_restorable() {
    let store = Arc::new(MemoryStore::new());
    let registry = FormRegistry::new(store.clone(), NetworkMonitor::default());
    let form = registry.open(config(), defaults()).await.unwrap();
    assert_eq!(form.recovery_state(), RecoveryState::NoRecord);

    form.set_step(2).unwrap();
    form.save().await.unwrap();
    form.set_step(3).unwrap();

    assert!(form.check_for_saved_data().await.unwrap());
    let restored = form.restore().await.unwrap();
    assert_eq!(
        restored,
        Some(json!({"step": 2, "preferences": {"categories": []}}))
    );
    assert_eq!(form.step(), 2);
    assert!(!form.is_dirty());
}

#[tokio::test]
async fn test_second_restore_returns_stored_draft() {
    let draft = json!({"step": 1, "company": "Taco Hut"});
    let (registry, _, _) = registry_with_draft(draft.clone()).await;
    let form = registry.open(config(), defaults()).await.unwrap();

    assert_eq!(form.restore().await.unwrap(), Some(draft.clone()));
    assert_eq!(form.recovery_state(), RecoveryState::Restored);

    form.set_step(4).unwrap();
    assert_eq!(form.restore().await.unwrap(), Some(draft));
    assert_eq!(form.step(), 1);

    form.clear().await.unwrap();
    assert!(!form.check_for_saved_data().await.unwrap());
    assert_eq!(form.restore().await.unwrap(), None);
}

#[tokio::test]
async fn test_restored_draft_without_step_is_clean() {
    let (registry, store, _) = registry_with_draft(json!({"name": "Ada"})).await;
    let form = registry.open(config(), defaults()).await.unwrap();

    assert_eq!(form.restore().await.unwrap(), Some(json!({"name": "Ada"})));
    assert_eq!(form.snapshot(), json!({"name": "Ada", "step": 0}));
    assert!(!form.is_dirty());

    // Nothing to write, so the stored draft is left as it was.
    assert_eq!(form.save().await.unwrap(), None);
    assert_eq!(store.load(&key()).await.unwrap(), Some(json!({"name": "Ada"})));
}
