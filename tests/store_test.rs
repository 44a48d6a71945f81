//! Tests for the in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use mimir::{CacheKey, ComputeFuture, MemoryStore, MimirError, Store, StoreConfig, StoreOptions};

fn key(name: &str) -> CacheKey {
    CacheKey::from_components(["Post", name])
}

fn counting(calls: &Arc<AtomicUsize>, value: Value) -> ComputeFuture<'static> {
    let calls = Arc::clone(calls);
    Box::pin(async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(value)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_compute_once() {
    let store = Arc::new(MemoryStore::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                store
                    .fetch_or_compute(&key("a"), &StoreOptions::new(), counting(&calls, json!(1)))
                    .await
            })
        })
        .collect();

    let mut misses = 0;
    for handle in handles {
        let fetched = handle.await.unwrap().unwrap();
        assert_eq!(fetched.value, json!(1));
        if !fetched.was_hit {
            misses += 1;
        }
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(misses, 1);
}

#[tokio::test]
async fn distinct_keys_compute_separately() {
    let store = MemoryStore::default();
    let calls = Arc::new(AtomicUsize::new(0));

    store
        .fetch_or_compute(&key("a"), &StoreOptions::new(), counting(&calls, json!("a")))
        .await
        .unwrap();
    store
        .fetch_or_compute(&key("b"), &StoreOptions::new(), counting(&calls, json!("b")))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.get(&key("a")).await, Some(json!("a")));
    assert_eq!(store.get(&key("b")).await, Some(json!("b")));
}

#[tokio::test]
async fn per_entry_expiry_is_honoured() {
    let store = MemoryStore::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = StoreOptions::new().expires_in(Duration::from_millis(50));

    store
        .fetch_or_compute(&key("a"), &options, counting(&calls, json!(1)))
        .await
        .unwrap();
    assert!(store.contains(&key("a")));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.get(&key("a")).await, None);

    let fetched = store
        .fetch_or_compute(&key("a"), &options, counting(&calls, json!(2)))
        .await
        .unwrap();
    assert!(!fetched.was_hit);
    assert_eq!(fetched.value, json!(2));
}

#[tokio::test]
async fn default_ttl_applies_without_per_entry_expiry() {
    let store = MemoryStore::new(&StoreConfig::new().ttl(Duration::from_millis(50)));
    let calls = Arc::new(AtomicUsize::new(0));

    store
        .fetch_or_compute(&key("a"), &StoreOptions::new(), counting(&calls, json!(1)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.get(&key("a")).await, None);
}

#[tokio::test]
async fn delete_of_missing_key_succeeds() {
    let store = MemoryStore::default();
    store.delete(&key("never-written")).await.unwrap();
}

#[tokio::test]
async fn failed_compute_leaves_no_entry() {
    let store = MemoryStore::default();
    let failing: ComputeFuture<'static> =
        Box::pin(async { Err(MimirError::compute("boom")) });

    let err = store
        .fetch_or_compute(&key("a"), &StoreOptions::new(), failing)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("boom"));
    assert!(!store.contains(&key("a")));
}

#[tokio::test]
async fn capacity_is_bounded() {
    let store = MemoryStore::new(&StoreConfig::new().max_entries(10));
    for i in 0..100 {
        let compute: ComputeFuture<'static> = Box::pin(async move { Ok(json!(i)) });
        store
            .fetch_or_compute(&key(&i.to_string()), &StoreOptions::new(), compute)
            .await
            .unwrap();
    }
    store.sync().await;

    assert!(store.len() <= 10, "len = {}", store.len());
}
