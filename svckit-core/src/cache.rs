//! Cache client abstraction with read-through and advisory-lock helpers.
//!
//! [`CacheBackend`] covers the handful of primitive commands the helpers need.
//! Everything else goes straight through [`Cache::client`] to the native client.

use std::{fmt::Debug, future::Future, time::Duration};

use async_trait::async_trait;

use crate::error::{CacheError, CacheResult};

/// Prefix of every lock key.
pub const LOCK_PREFIX: &str = "lock:";

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after the given duration.
    Expires(Duration),
}

/// Primitive cache commands.
///
/// Implementations hold one shared client and must be usable from many tasks at once.
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// `GET key`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `SET key value [EX ttl]`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// `SET key value NX EX ttl`. Returns `true` when the key was created.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// `TTL key`.
    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl>;

    /// `EXPIRE key ttl`. Returns `true` when the key exists.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// `DEL key`. Returns the number of removed keys.
    async fn del(&self, key: &str) -> CacheResult<u64>;
}

/// Cache wrapper exposing the raw client plus the read-through and lock helpers.
#[derive(Debug)]
pub struct Cache<B: CacheBackend> {
    backend: B,
}

impl<B: CacheBackend> Cache<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the underlying client for commands the helpers do not cover.
    pub fn client(&self) -> &B {
        &self.backend
    }

    /// Read-through lookup.
    ///
    /// Returns the cached value when present and non-empty. Otherwise runs
    /// `producer`, stores its value under `key` with `ttl` and returns it.
    ///
    /// Producer errors are returned as-is and nothing is cached.
    pub async fn cache_get<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: From<CacheError>,
    {
        if let Some(cached) = self.backend.get(key).await?.filter(|value| !value.is_empty()) {
            return Ok(cached);
        }

        let produced = producer().await?;
        self.backend.set(key, &produced, ttl).await?;

        tracing::debug!(key, "cache miss filled");

        Ok(produced)
    }

    /// Tries to take the advisory lock `lock:<key>` for `expire` seconds.
    ///
    /// Returns `true` only when this call created the lock. When the lock exists
    /// without an expiry, the expiry is applied so it cannot be held forever,
    /// and the call still reports failure. Backend errors count as not acquired.
    pub async fn lock(&self, key: &str, expire: u64) -> bool {
        let name = format!("{LOCK_PREFIX}{key}");
        let ttl = Duration::from_secs(expire);

        match self.backend.set_nx(&name, "1", ttl).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(lock = %name, error = %err, "failed to acquire lock");
                return false;
            }
        }

        if let Ok(KeyTtl::Persistent) = self.backend.ttl(&name).await {
            tracing::warn!(lock = %name, "lock held without expiry, applying ttl");

            if let Err(err) = self.backend.expire(&name, ttl).await {
                tracing::warn!(lock = %name, error = %err, "failed to expire stale lock");
            }
        }

        false
    }

    /// Releases the advisory lock `lock:<key>`.
    ///
    /// Returns `true` whether the lock was removed or had already expired,
    /// `false` only when the backend failed.
    pub async fn unlock(&self, key: &str) -> bool {
        let name = format!("{LOCK_PREFIX}{key}");

        match self.backend.del(&name).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(lock = %name, error = %err, "failed to release lock");
                false
            }
        }
    }
}

impl<B: CacheBackend> From<B> for Cache<B> {
    fn from(backend: B) -> Self {
        Self::new(backend)
    }
}
