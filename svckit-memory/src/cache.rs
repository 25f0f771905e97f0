//! In-memory cache backend with per-key expiry.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use mea::mutex::Mutex;

use svckit_core::{
    cache::{CacheBackend, KeyTtl},
    error::CacheResult,
};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Thread-safe in-memory [`CacheBackend`].
///
/// Expired keys are dropped when read and swept on every write. Clones share
/// the same entries.
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stores a key without expiry even if it exists.
    ///
    /// Mirrors a lock left behind by a crashed holder that never set a TTL.
    pub async fn set_persistent(&self, key: &str, value: &str) {
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

/// Drops every expired entry. Runs on writes so keys that are never read again do not pile up.
fn sweep(entries: &mut HashMap<String, Entry>) {
    let now = Instant::now();
    entries.retain(|_, entry| entry.is_live(now));
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;

        Ok(live(&mut entries, key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.lock().await;
        sweep(&mut entries);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        sweep(&mut entries);
        if entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );

        Ok(true)
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        let mut entries = self.entries.lock().await;

        Ok(match live(&mut entries, key) {
            None => KeyTtl::Missing,
            Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;

        Ok(match live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        })
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let mut entries = self.entries.lock().await;

        let existed = live(&mut entries, key).is_some();
        entries.remove(key);

        Ok(u64::from(existed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_expire() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.ttl("k").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn writes_sweep_expired_keys() {
        let cache = InMemoryCache::new();
        for key in ["a", "b", "c"] {
            cache
                .set(key, "v", Some(Duration::from_millis(10)))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.set("d", "v", None).await.unwrap();

        let entries = cache.entries.lock().await;
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["d"]);
    }

    #[tokio::test]
    async fn set_nx_only_creates() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(5);

        assert!(cache.set_nx("k", "1", ttl).await.unwrap());
        assert!(!cache.set_nx("k", "2", ttl).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("1"));
        assert!(matches!(cache.ttl("k").await.unwrap(), KeyTtl::Expires(_)));
    }

    #[tokio::test]
    async fn persistent_keys_can_be_expired_and_deleted() {
        let cache = InMemoryCache::new();
        cache.set_persistent("k", "1").await;

        assert_eq!(cache.ttl("k").await.unwrap(), KeyTtl::Persistent);
        assert!(cache.expire("k", Duration::from_secs(5)).await.unwrap());
        assert!(matches!(cache.ttl("k").await.unwrap(), KeyTtl::Expires(_)));
        assert_eq!(cache.del("k").await.unwrap(), 1);
        assert_eq!(cache.del("k").await.unwrap(), 0);
    }
}
