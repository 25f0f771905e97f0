//! Convenient re-exports of commonly used types from svckit.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use svckit::prelude::*;
//! ```

pub use bson::{Bson, doc, oid::ObjectId};
pub use serde::{Deserialize, Serialize};

pub use svckit_core::{
    backend::{CollectionPath, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    cache::{Cache, CacheBackend},
    collection::CollectionHandle,
    config::{ConfigLoader, ConfigStore, Section},
    document::{Document, IsZero},
    error::{CacheError, ConfigError, DocumentStoreError, DocumentStoreResult},
    log::LogContext,
    query::{Expr, Filter, Projection, Query, ReadMode, Sort, SortDirection, Stage},
    store::DocumentStore,
};
pub use svckit_macros::{Document, IsZero};

pub use crate::app::{App, ServiceError};
