//! Sync reconciliation engine tests
//!
//! Covers:
//! - End-to-end scenarios: clean pass, retry exhaustion, partial success
//! - At-most-one concurrent pass
//! - Offline trigger is a no-op
//! - Synced-flag convergence
//! - Progress events and the sync journal
//!
//! Note: `set_connectivity(true)` runs one pass inline, so tests go online
//! before enqueueing the mutations they want to drain explicitly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{open_store, rejection, MockEndpoint};
use parking_lot::Mutex;
use satchel::SyncStatus;
use serde_json::json;

#[tokio::test]
async fn test_scenario_single_create_accepted() {
    let mock = Arc::new(MockEndpoint::accepting());
    let (store, _tmp) = open_store(mock.clone());
    store.set_connectivity(true).await;

    store
        .write("notes", "note", json!({"title": "hello"}), Some("r1".to_string()))
        .unwrap();
    assert!(!store.get_record("r1").unwrap().unwrap().synced);

    let report = store.trigger_sync().await;

    assert!(report.success);
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 0);
    assert!(report.errors.is_empty());

    assert!(store.get_record("r1").unwrap().unwrap().synced);
    assert_eq!(store.pending_count().unwrap(), 0);
    assert_eq!(mock.call_count(), 1);
    assert!(store.last_synced_at().is_some());
}

#[tokio::test]
async fn test_scenario_retries_exhaust_but_operation_stays() {
    let mock = Arc::new(MockEndpoint::rejecting("server unavailable"));
    let (store, _tmp) = open_store(mock.clone());
    store.set_connectivity(true).await;

    store
        .write("notes", "note", json!({"title": "stuck"}), Some("r1".to_string()))
        .unwrap();

    // Three failing passes increment the retry counter to the cap
    for expected_retry in 1..=3u32 {
        let report = store.trigger_sync().await;
        assert!(!report.success);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].recoverable);

        let ops = store.pending_operations().unwrap();
        assert_eq!(ops[0].retry_count, expected_retry);
    }
    assert_eq!(mock.call_count(), 3);

    // Fourth pass: automatic retry has stopped, the remote is not called,
    // and the operation is surfaced as non-recoverable
    let report = store.trigger_sync().await;
    assert!(!report.success);
    assert_eq!(report.synced, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(!report.errors[0].recoverable);
    assert_eq!(mock.call_count(), 3);

    let ops = store.pending_operations().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].retry_count, 3);
    assert!(!store.get_record("r1").unwrap().unwrap().synced);
}

#[tokio::test]
async fn test_scenario_partial_success() {
    let mock = Arc::new(MockEndpoint::with_script(vec![
        Ok(()),
        Err(rejection("bad payload")),
    ]));
    let (store, _tmp) = open_store(mock.clone());
    store.set_connectivity(true).await;

    store
        .write("notes", "note", json!({"n": 1}), Some("r1".to_string()))
        .unwrap();
    store
        .write("notes", "note", json!({"n": 2}), Some("r2".to_string()))
        .unwrap();

    let report = store.trigger_sync().await;

    assert!(!report.success);
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].recoverable);

    assert!(store.get_record("r1").unwrap().unwrap().synced);
    assert!(!store.get_record("r2").unwrap().unwrap().synced);

    let ops = store.pending_operations().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].record_id, "r2");
    assert_eq!(ops[0].retry_count, 1);
}

#[tokio::test]
async fn test_at_most_one_concurrent_pass() {
    let mock = Arc::new(MockEndpoint::accepting().with_delay(Duration::from_millis(100)));
    let (store, _tmp) = open_store(mock.clone());
    store.set_connectivity(true).await;

    store.write("notes", "note", json!({"n": 1}), None).unwrap();
    store.write("notes", "note", json!({"n": 2}), None).unwrap();

    let store = Arc::new(store);
    let (r1, r2) = tokio::join!(store.trigger_sync(), store.trigger_sync());

    // Exactly one pass ran; the other returned the empty no-op report
    let (ran, skipped) = if r1.synced > 0 { (r1, r2) } else { (r2, r1) };
    assert!(ran.success);
    assert_eq!(ran.synced, 2);
    assert!(!skipped.success);
    assert_eq!(skipped.synced, 0);
    assert_eq!(skipped.failed, 0);
    assert!(skipped.errors.is_empty());

    // Each operation was delivered once
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_trigger_while_offline_is_noop() {
    let mock = Arc::new(MockEndpoint::accepting());
    let (store, _tmp) = open_store(mock.clone());

    store.write("notes", "note", json!({"n": 1}), None).unwrap();

    // Store starts offline
    let report = store.trigger_sync().await;
    assert!(!report.success);
    assert_eq!(report.synced, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(mock.call_count(), 0);
    assert_eq!(store.pending_count().unwrap(), 1);
}

#[tokio::test]
async fn test_operations_drain_in_enqueue_order() {
    let mock = Arc::new(MockEndpoint::accepting());
    let (store, _tmp) = open_store(mock.clone());
    store.set_connectivity(true).await;

    store
        .write("notes", "note", json!({"v": 1}), Some("r1".to_string()))
        .unwrap();
    store.update("r1", "notes", json!({"v": 2})).unwrap();
    store.update("r1", "notes", json!({"v": 3})).unwrap();

    let queued: Vec<String> = store
        .pending_operations()
        .unwrap()
        .iter()
        .map(|op| op.id.clone())
        .collect();

    let report = store.trigger_sync().await;

    assert!(report.success);
    assert_eq!(report.synced, 3);
    assert!(store.pending_operations().unwrap().is_empty());

    // Create first, then the updates in mutation order
    assert_eq!(mock.calls(), queued);
    assert!(store.get_record("r1").unwrap().unwrap().synced);
    assert_eq!(store.get("r1").unwrap().unwrap(), json!({"v": 3}));
}

#[tokio::test]
async fn test_operations_enqueued_mid_pass_wait_for_next_pass() {
    let mock = Arc::new(MockEndpoint::accepting().with_delay(Duration::from_millis(80)));
    let (store, _tmp) = open_store(mock.clone());
    store.set_connectivity(true).await;

    store.write("notes", "note", json!({"n": 1}), None).unwrap();

    let store = Arc::new(store);
    let syncing = {
        let store = store.clone();
        tokio::spawn(async move { store.trigger_sync().await })
    };

    // Give the pass time to snapshot, then enqueue another mutation
    tokio::time::sleep(Duration::from_millis(30)).await;
    store.write("notes", "note", json!({"n": 2}), None).unwrap();

    let report = syncing.await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(store.pending_count().unwrap(), 1);

    let report = store.trigger_sync().await;
    assert_eq!(report.synced, 1);
    assert_eq!(store.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_progress_events_monotonic_and_final_100() {
    let mock = Arc::new(MockEndpoint::with_script(vec![
        Ok(()),
        Err(rejection("nope")),
        Ok(()),
    ]));
    let (store, _tmp) = open_store(mock);
    store.set_connectivity(true).await;

    for i in 0..3 {
        store
            .write("notes", "note", json!({"n": i}), Some(format!("r{}", i)))
            .unwrap();
    }

    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let _sub = store.subscribe_progress(move |percent| {
        seen_cb.lock().push(*percent);
    });

    let report = store.trigger_sync().await;
    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 1);

    let seen = seen.lock();
    // One event per operation plus the final 100
    assert_eq!(seen.as_slice(), &[33, 66, 100, 100]);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_empty_pass_emits_final_100() {
    let mock = Arc::new(MockEndpoint::accepting());
    let (store, _tmp) = open_store(mock);

    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let _sub = store.subscribe_progress(move |percent| {
        seen_cb.lock().push(*percent);
    });

    // The online edge runs one (empty) pass inline
    store.set_connectivity(true).await;
    assert_eq!(seen.lock().as_slice(), &[100]);
}

#[tokio::test]
async fn test_sync_journal_records_each_attempt() {
    let mock = Arc::new(MockEndpoint::with_script(vec![
        Err(rejection("transient")),
        Ok(()),
    ]));
    let (store, _tmp) = open_store(mock);
    store.set_connectivity(true).await;

    store
        .write("notes", "note", json!({"n": 1}), Some("r1".to_string()))
        .unwrap();

    store.trigger_sync().await; // rejected
    store.trigger_sync().await; // accepted

    let entries = store.sync_log_entries(0, 100).unwrap();
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0].status, SyncStatus::Failed);
    assert_eq!(entries[0].detail.as_deref(), Some("transient"));
    assert_eq!(entries[1].status, SyncStatus::Success);
    assert!(entries[1].detail.is_none());
    assert_eq!(entries[0].operation_id, entries[1].operation_id);
    assert!(entries[0].sequence < entries[1].sequence);
}

#[tokio::test]
async fn test_delete_operation_drains_cleanly() {
    let mock = Arc::new(MockEndpoint::accepting());
    let (store, _tmp) = open_store(mock.clone());
    store.set_connectivity(true).await;

    store
        .write("notes", "note", json!({"n": 1}), Some("r1".to_string()))
        .unwrap();
    store.trigger_sync().await;

    store.delete("r1", "notes").unwrap();
    assert!(store.get("r1").unwrap().is_none());

    let report = store.trigger_sync().await;
    assert!(report.success);
    assert_eq!(report.synced, 1);
    assert_eq!(store.pending_count().unwrap(), 0);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_failed_pass_does_not_update_last_synced_at() {
    let mock = Arc::new(MockEndpoint::rejecting("down"));
    let (store, _tmp) = open_store(mock);

    // The online edge runs a clean empty pass, which counts as synced
    store.set_connectivity(true).await;
    let clean = store.last_synced_at();
    assert!(clean.is_some());

    store.write("notes", "note", json!({}), None).unwrap();

    let report = store.trigger_sync().await;
    assert!(!report.success);
    assert_eq!(store.last_synced_at(), clean);
}
