//! Connection settings bound from the `db.redis` config section.

use serde::{Deserialize, Deserializer};
use url::Url;

use svckit_core::{
    config::Section,
    error::{CacheError, CacheResult},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// `host:port`.
    pub addr: String,
    pub password: String,
    #[serde(alias = "dao")]
    pub db: i64,
    /// Accepted for compatibility. The connection manager multiplexes one connection.
    pub pool_size: u32,
    /// Accepted for compatibility. The connection manager multiplexes one connection.
    pub min_idle_conns: u32,
    /// TLS without certificate verification. Accepts `true`/`false` or `1`/`0`.
    #[serde(deserialize_with = "flag")]
    pub is_enable_tls: bool,
}

impl Section for RedisSettings {
    const NODE: &'static str = "db";
    const KEY: &'static str = "redis";
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value == 1,
    })
}

impl RedisSettings {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    /// Connection URL in the client's `redis[s]://[:password@]host:port/db` form.
    pub fn url(&self) -> CacheResult<Url> {
        let scheme = if self.is_enable_tls { "rediss" } else { "redis" };
        let mut url = Url::parse(&format!("{scheme}://{}", self.addr))
            .map_err(|e| CacheError::Initialization(format!("invalid redis address {}: {e}", self.addr)))?;

        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| CacheError::Initialization(format!("cannot set a password on {}", self.addr)))?;
        }
        url.set_path(&self.db.to_string());
        if self.is_enable_tls {
            url.set_fragment(Some("insecure"));
        }

        Ok(url)
    }
}
