//! Redis backend implementation for svckit.
//!
//! This crate provides a Redis-based implementation of the `CacheBackend` trait
//! on top of a multiplexed, auto-reconnecting [`redis::aio::ConnectionManager`].
//! The manager is also what [`Cache::client`](svckit_core::cache::Cache::client)
//! hands out for commands the helpers do not cover.
//!
//! To use this backend, include the `redis` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! svckit = { version = "x.y.z", features = ["redis"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use svckit::{cache::Cache, redis::{RedisCache, RedisSettings}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = RedisSettings::new("localhost:6379");
//!     let cache = Cache::new(RedisCache::connect(&settings).await?);
//!
//!     if cache.lock("daily-report", 60).await {
//!         // ...
//!         cache.unlock("daily-report").await;
//!     }
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as svckit_redis;

pub mod cache;
pub mod settings;

pub use cache::RedisCache;
pub use settings::RedisSettings;
