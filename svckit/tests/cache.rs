use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use svckit::{cache::KeyTtl, memory::InMemoryCache, prelude::*};

#[tokio::test]
async fn lock_is_taken_once_until_released() {
    let cache = Cache::new(InMemoryCache::new());

    assert!(cache.lock("report", 10).await);
    assert!(!cache.lock("report", 10).await);
    assert!(cache.unlock("report").await);
    assert!(cache.lock("report", 10).await);
}

#[tokio::test]
async fn unlock_of_a_missing_lock_reports_released() {
    let cache = Cache::new(InMemoryCache::new());

    assert!(cache.unlock("never-taken").await);
}

#[tokio::test]
async fn lock_without_expiry_gets_one_and_still_fails() {
    let cache = Cache::new(InMemoryCache::new());
    cache.client().set_persistent("lock:report", "1").await;

    assert!(!cache.lock("report", 10).await);
    assert!(matches!(
        cache.client().ttl("lock:report").await.unwrap(),
        KeyTtl::Expires(_)
    ));
}

#[tokio::test]
async fn expired_lock_can_be_taken_again() {
    let cache = Cache::new(InMemoryCache::new());
    cache
        .client()
        .set_nx("lock:report", "1", Duration::from_millis(20))
        .await
        .unwrap();

    assert!(!cache.lock("report", 10).await);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(cache.lock("report", 10).await);
}

#[tokio::test]
async fn cache_get_returns_and_stores_the_produced_value() {
    let cache = Cache::new(InMemoryCache::new());
    let counter = AtomicUsize::new(0);
    let calls = &counter;
    let produce = move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, CacheError>("fresh".to_string())
    };

    let first = cache.cache_get("profile:1", None, produce).await.unwrap();
    let second = cache.cache_get("profile:1", None, produce).await.unwrap();

    assert_eq!(first, "fresh");
    assert_eq!(second, "fresh");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(
        cache.client().get("profile:1").await.unwrap().as_deref(),
        Some("fresh")
    );
}

#[tokio::test]
async fn empty_cached_values_are_refilled() {
    let cache = Cache::new(InMemoryCache::new());
    cache.client().set("profile:1", "", None).await.unwrap();

    let value = cache
        .cache_get("profile:1", Some(Duration::from_secs(60)), || async {
            Ok::<_, CacheError>("fresh".to_string())
        })
        .await
        .unwrap();

    assert_eq!(value, "fresh");
    assert!(matches!(
        cache.client().ttl("profile:1").await.unwrap(),
        KeyTtl::Expires(_)
    ));
}

#[tokio::test]
async fn producer_errors_are_not_cached() {
    let cache = Cache::new(InMemoryCache::new());

    let result = cache
        .cache_get("profile:1", None, || async {
            Err::<String, _>(CacheError::Backend("source down".into()))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(cache.client().get("profile:1").await.unwrap(), None);
}
