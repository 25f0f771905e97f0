//! MongoDB backend implementation for svckit.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filters, sort keys, projections and pipeline stages are translated to the
//! server's native syntax and executed by its query engine.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! svckit = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The client is configured from the `mongo` key of the `db` config node
//! ([`MongoSettings`]): pool size, idle time, credentials, replica set and TLS.
//! Reads are retried by the driver, writes are not.
//!
//! # Example
//!
//! ```ignore
//! use svckit::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as svckit_mongodb;

pub mod query;
pub mod settings;
pub mod store;

pub use settings::MongoSettings;
pub use store::{MongoDbStore, MongoDbStoreBuilder};
