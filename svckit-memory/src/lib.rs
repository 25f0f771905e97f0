//! In-memory backends for svckit.
//!
//! This crate provides thread-safe, in-memory implementations of the
//! `StoreBackend` and `CacheBackend` traits. They use async-aware locks for
//! concurrent access and are meant for tests and local development.
//!
//! # Features
//!
//! - **Document store** - Filtering, multi-key sorting, pagination, projection,
//!   upserts and typed aggregation stages
//! - **Cache** - String values with per-key expiry, enough for the read-through
//!   and lock helpers
//!
//! # Quick Start
//!
//! ```ignore
//! use svckit::{prelude::*, memory::{InMemoryCache, InMemoryStore}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let cache = Cache::new(InMemoryCache::new());
//!
//!     let id = store.collection("users").insert_one(&doc! { "name": "Alice" }).await?;
//!     assert!(cache.lock("users", 10).await);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as svckit_memory;

pub mod cache;
pub mod evaluator;
pub mod store;

pub use cache::InMemoryCache;
pub use store::{InMemoryStore, InMemoryStoreBuilder};
