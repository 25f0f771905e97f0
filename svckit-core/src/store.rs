//! Main document store interface.
//!
//! A [`DocumentStore`] owns one backend and hands out short-lived
//! [`CollectionHandle`]s, one per logical operation.
//!
//! # Example
//!
//! ```ignore
//! use svckit::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! let id = store.collection("users").insert_one(&user).await?;
//! ```

use crate::{
    backend::{CollectionPath, StoreBackend},
    collection::CollectionHandle,
    error::DocumentStoreResult,
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Opens a handle on a collection of the default database.
    pub fn collection<'a>(&'a self, name: &str) -> CollectionHandle<'a, B> {
        CollectionHandle::new(&self.backend, CollectionPath::new(name))
    }

    /// Opens a handle on a collection of another database.
    pub fn collection_in<'a>(&'a self, database: &str, name: &str) -> CollectionHandle<'a, B> {
        CollectionHandle::new(&self.backend, CollectionPath::in_database(database, name))
    }

    /// Shuts down the store and its backend.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

impl<B: StoreBackend> From<B> for DocumentStore<B> {
    fn from(backend: B) -> Self {
        Self::new(backend)
    }
}
