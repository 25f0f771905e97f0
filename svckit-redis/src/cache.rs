use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, RedisError, aio::ConnectionManager};

use svckit_core::{
    cache::{CacheBackend, KeyTtl},
    error::{CacheError, CacheResult},
};

use crate::settings::RedisSettings;

/// [`CacheBackend`] over a shared [`ConnectionManager`].
///
/// Clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Opens a client from `settings` and establishes the managed connection.
    pub async fn connect(settings: &RedisSettings) -> CacheResult<Self> {
        let client = Client::open(settings.url()?.as_str())
            .map_err(|e| CacheError::Initialization(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Initialization(e.to_string()))?;

        tracing::info!(addr = %settings.addr, db = settings.db, tls = settings.is_enable_tls, "connected to redis");

        Ok(Self::new(manager))
    }

    /// Returns a handle on the managed connection for commands outside [`CacheBackend`].
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn backend_error(error: RedisError) -> CacheError {
    CacheError::Backend(error.to_string())
}

/// Whole seconds, at least one, as the server rejects a zero expiry.
fn seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut connection = self.connection();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut connection = self.connection();
        let mut command = redis::cmd("SET");
        command.arg(key).arg(value);
        if let Some(ttl) = ttl {
            command.arg("EX").arg(seconds(ttl));
        }

        let _: () = command
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut connection = self.connection();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(seconds(ttl))
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;

        Ok(reply.is_some())
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        let mut connection = self.connection();
        let reply: i64 = redis::cmd("TTL")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;

        Ok(match reply {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            secs => KeyTtl::Expires(Duration::from_secs(secs.max(0).unsigned_abs())),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut connection = self.connection();
        let reply: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds(ttl))
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;

        Ok(reply == 1)
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let mut connection = self.connection();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_never_rounds_to_zero() {
        assert_eq!(seconds(Duration::from_millis(200)), 1);
        assert_eq!(seconds(Duration::from_secs(30)), 30);
    }
}
