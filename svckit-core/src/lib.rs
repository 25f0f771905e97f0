//! Core of the svckit service toolkit.
//!
//! This crate holds everything that does not depend on a concrete database or
//! cache driver:
//!
//! - **Config** ([`config`]) - Directory-tree TOML loading and typed section binding
//! - **Documents** ([`document`]) - Field projection and the pre-create / pre-update transforms
//! - **Queries** ([`query`]) - Filter expressions, sort keys, projections and pipeline stages
//! - **Collection handle** ([`collection`]) - The fluent per-collection query API
//! - **Store** ([`store`]) and **backend** ([`backend`]) - The driver seam for document stores
//! - **Cache** ([`cache`]) - The driver seam for caches plus read-through and lock helpers
//! - **Logging** ([`log`]) - Subscriber setup, log contexts and the request interceptor
//! - **Unique ids** ([`unique`]) - Time-ordered integer ids and UUIDs
//! - **Errors** ([`error`]), **status codes** ([`status`]), **run environment** ([`env`])
//!   and assorted helpers ([`funcs`])
//!
//! # Example
//!
//! ```ignore
//! use svckit::prelude::*;
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
//! let id = store.collection("users").insert_one(&user).await?;
//! let user: User = store.collection("users").find_by_id(id).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as svckit_core;

pub mod backend;
pub mod cache;
pub mod collection;
pub mod config;
pub mod document;
pub mod env;
pub mod error;
pub mod funcs;
pub mod log;
pub mod query;
pub mod status;
pub mod store;
pub mod unique;
