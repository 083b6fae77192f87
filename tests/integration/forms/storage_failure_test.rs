//! Storage failures degrade the form instead of breaking it

use std::sync::Arc;

use crate::common::FlakyStore;
use formstash::offline::{AutosaveTarget, FormSnapshot, OfflineForm, TickOutcome};
use formstash::shared::{FailureReason, FormConfig};
use formstash::sync::NetworkMonitor;
use serde_json::json;

async fn open(store: Arc<FlakyStore>) -> Arc<OfflineForm> {
    let config = FormConfig::builder("deal-edit", "42")
        .auto_save(false)
        .max_consecutive_save_failures(3)
        .build()
        .unwrap();
    OfflineForm::open(config, FormSnapshot::default(), store, NetworkMonitor::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_failed_save_surfaces_storage_reason() {
    let store = Arc::new(FlakyStore::in_memory());
    let form = open(store.clone()).await;
    store.fail_saves(true);

    form.set_field("title", json!("Tacos")).unwrap();
    let error = form.save().await.unwrap_err();
    assert_eq!(error.reason(), FailureReason::Storage);

    let meta = form.metadata();
    assert!(meta.is_dirty);
    assert!(!meta.has_persisted_data);
    crate::assert_contains!(meta.last_error.unwrap(), "quota exceeded");
}

#[tokio::test]
async fn test_autosave_suspends_after_repeated_failures() {
    let store = Arc::new(FlakyStore::in_memory());
    let form = open(store.clone()).await;
    store.fail_saves(true);
    form.set_field("title", json!("Tacos")).unwrap();

    assert_eq!(form.autosave_tick().await, TickOutcome::Failed);
    assert_eq!(form.autosave_tick().await, TickOutcome::Failed);
    assert_eq!(form.autosave_tick().await, TickOutcome::Suspended);
    assert!(form.metadata().autosave_suspended);

    // Suspended ticks stop hitting the store.
    assert_eq!(form.autosave_tick().await, TickOutcome::Suspended);
    assert_eq!(store.save_attempts(), 3);

    // The form keeps working.
    form.set_field("price", json!(4.5)).unwrap();
    assert!(form.is_dirty());
}

#[tokio::test]
async fn test_manual_save_rearms_autosave() {
    let store = Arc::new(FlakyStore::in_memory());
    let form = open(store.clone()).await;
    store.fail_saves(true);
    form.set_field("title", json!("Tacos")).unwrap();
    for _ in 0..3 {
        form.autosave_tick().await;
    }
    assert!(form.metadata().autosave_suspended);

    store.fail_saves(false);
    assert!(form.save().await.unwrap().is_some());

    let meta = form.metadata();
    assert!(!meta.autosave_suspended);
    assert_eq!(meta.last_error, None);
    assert!(meta.has_persisted_data);
    assert_eq!(form.autosave_tick().await, TickOutcome::Clean);

    form.set_field("title", json!("Burritos")).unwrap();
    assert_eq!(form.autosave_tick().await, TickOutcome::Saved);
}
