//! Main svckit crate: thin, typed wrappers around the clients a backend service needs.
//!
//! This crate is the primary entry point for users of svckit. It re-exports
//! the core types and functionality from the sub-crates, the derive macros,
//! and the backends selected through cargo features.
//!
//! # Features
//!
//! - **Config** - Directory-tree TOML loading with typed section binding
//! - **Document store** - A fluent per-collection handle with identifier and timestamp injection
//! - **Cache** - Read-through caching and an advisory lock over a Redis-style backend
//! - **Logging** - `tracing` setup, log contexts and a request interceptor
//! - **Unique ids** - Time-ordered integer ids and UUIDs
//!
//! # Quick Start
//!
//! ```ignore
//! use svckit::{prelude::*, memory::InMemoryStore};
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Document)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: ObjectId,
//!     pub name: String,
//!     pub create_time: i64,
//!     pub update_time: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let users = store.collection("users");
//!
//!     let id = users
//!         .insert_one(&User { name: "Alice".into(), ..User::default() })
//!         .await?;
//!     let alice: User = users.find_by_id(id).await?;
//!
//!     println!("{alice:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Start-up
//!
//! [`App`] wires the components together from config files: it loads the
//! config tree, installs logging, then connects the store and the cache whose
//! sections are present.
//!
//! ```ignore
//! let app = svckit::App::builder().config_paths(["./config"]).start().await?;
//! let users = app.store()?.collection("users");
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory store and cache for development and testing
//! - `mongodb` - MongoDB document store (requires the `mongodb` feature)
//! - `redis` - Redis cache (requires the `redis` feature)

#[allow(unused_extern_crates)]
extern crate self as svckit;

pub mod app;
pub mod prelude;

pub use app::{App, AppBuilder, ServiceError};
pub use svckit_core::{
    backend, cache, collection, config, document, env, error, funcs, log, query, status, store,
    unique,
};
pub use svckit_core::impl_is_zero_by_default;
pub use svckit_macros::{Document, IsZero};

// Re-export BSON types for convenience
pub use bson;

/// In-memory backend implementations.
pub mod memory {
    pub use svckit_memory::{InMemoryCache, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use svckit_mongodb::{MongoDbStore, MongoDbStoreBuilder, MongoSettings};
}

/// Redis cache backend implementations.
///
/// This module is only available when the `redis` feature is enabled.
#[cfg(feature = "redis")]
pub mod redis {
    pub use svckit_redis::{RedisCache, RedisSettings};
}
