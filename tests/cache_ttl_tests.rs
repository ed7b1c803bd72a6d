//! Cache TTL tests
//!
//! Covers:
//! - Lazy eviction on read-after-expiry (entry removed from storage)
//! - Overwrite semantics on set
//! - Explicit sweep of expired entries
//! - Domain tagging

mod common;

use std::thread::sleep;
use std::time::Duration;

use common::create_test_engine;
use satchel::{CacheStore, Collection};
use serde_json::json;

#[test]
fn test_get_live_entry() {
    let (engine, _tmp) = create_test_engine();
    let cache = CacheStore::new(engine);

    cache
        .set("profile", json!({"name": "ada"}), Duration::from_secs(60), None)
        .unwrap();

    assert_eq!(cache.get("profile").unwrap(), Some(json!({"name": "ada"})));
}

#[test]
fn test_expired_entry_absent_and_removed_from_storage() {
    let (engine, _tmp) = create_test_engine();
    let cache = CacheStore::new(engine.clone());

    cache
        .set("ephemeral", json!(1), Duration::from_millis(50), None)
        .unwrap();
    assert!(engine.get(Collection::Cache, "ephemeral").unwrap().is_some());

    sleep(Duration::from_millis(120));

    // Expired: absent to the caller, and lazily deleted from the store
    assert_eq!(cache.get("ephemeral").unwrap(), None);
    assert!(engine.get(Collection::Cache, "ephemeral").unwrap().is_none());
}

#[test]
fn test_set_overwrites_existing_entry() {
    let (engine, _tmp) = create_test_engine();
    let cache = CacheStore::new(engine);

    cache
        .set("k", json!("old"), Duration::from_millis(50), None)
        .unwrap();
    cache
        .set("k", json!("new"), Duration::from_secs(60), None)
        .unwrap();

    // The overwrite refreshed the TTL as well as the value
    sleep(Duration::from_millis(120));
    assert_eq!(cache.get("k").unwrap(), Some(json!("new")));
}

#[test]
fn test_sweep_removes_only_expired() {
    let (engine, _tmp) = create_test_engine();
    let cache = CacheStore::new(engine);

    cache
        .set("short-a", json!(1), Duration::from_millis(40), None)
        .unwrap();
    cache
        .set("short-b", json!(2), Duration::from_millis(40), Some("notes"))
        .unwrap();
    cache
        .set("long", json!(3), Duration::from_secs(60), None)
        .unwrap();

    sleep(Duration::from_millis(120));

    let removed = cache.sweep().unwrap();
    assert_eq!(removed, 2);
    assert_eq!(cache.len().unwrap(), 1);
    assert_eq!(cache.get("long").unwrap(), Some(json!(3)));

    // Idempotent: nothing left to remove
    assert_eq!(cache.sweep().unwrap(), 0);
}

#[test]
fn test_remove_entry() {
    let (engine, _tmp) = create_test_engine();
    let cache = CacheStore::new(engine);

    cache
        .set("k", json!(true), Duration::from_secs(60), None)
        .unwrap();
    cache.remove("k").unwrap();
    assert_eq!(cache.get("k").unwrap(), None);
}

#[tokio::test]
async fn test_background_sweeper_evicts_expired_entries() {
    let (engine, _tmp) = create_test_engine();
    let cache = CacheStore::new(engine);

    cache
        .set("doomed", json!(1), Duration::from_millis(30), None)
        .unwrap();
    cache
        .set("kept", json!(2), Duration::from_secs(60), None)
        .unwrap();

    let sweeper = std::sync::Arc::new(satchel::CacheSweeper::new(
        cache.clone(),
        Duration::from_millis(50),
    ));
    let handle = tokio::spawn(sweeper.start());

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.abort();

    assert_eq!(cache.len().unwrap(), 1);
    assert_eq!(cache.get("kept").unwrap(), Some(json!(2)));
}

#[test]
fn test_domain_tag_is_persisted() {
    let (engine, _tmp) = create_test_engine();
    let cache = CacheStore::new(engine.clone());

    cache
        .set("tagged", json!(1), Duration::from_secs(60), Some("sessions"))
        .unwrap();

    let raw = engine.get(Collection::Cache, "tagged").unwrap().unwrap();
    let entry: satchel::CacheEntry = serde_json::from_slice(&raw).unwrap();
    assert_eq!(entry.domain.as_deref(), Some("sessions"));
    assert_eq!(entry.key, "tagged");
}
