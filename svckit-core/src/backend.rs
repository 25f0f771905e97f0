//! Storage backend abstraction for the document store.
//!
//! The [`StoreBackend`] trait is the seam between the fluent
//! [`CollectionHandle`](crate::collection::CollectionHandle) and a concrete
//! driver. Backends receive documents that have already been through the
//! pre-create / pre-update transforms, together with the accumulated
//! [`Query`], and only have to execute them.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances

use std::fmt::{self, Debug, Display};

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::{
    error::DocumentStoreResult,
    query::{Query, Stage},
};

/// Addresses a collection, optionally in a database other than the backend's default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    pub database: Option<String>,
    pub collection: String,
}

impl CollectionPath {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            database: None,
            collection: collection.into(),
        }
    }

    pub fn in_database(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            collection: collection.into(),
        }
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{}.{}", database, self.collection),
            None => f.write_str(&self.collection),
        }
    }
}

/// Options for [`StoreBackend::update_documents`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Apply the patch to every matching document instead of the first one.
    pub many: bool,
    /// Create a document when nothing matches.
    pub upsert: bool,
}

/// Result of an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Number of documents matching the filter.
    pub matched: u64,
    /// Number of documents actually changed.
    pub modified: u64,
    /// Identifier of the document created by an upsert, if any.
    pub upserted_id: Option<Bson>,
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Backends wrapping a driver client normally rely on the client's own
/// connection pool and add no locking of their own.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Backends must report an identifier collision as
/// [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts documents and returns their identifiers in input order.
    ///
    /// Documents without an `_id` get one assigned by the backend.
    async fn insert_documents(
        &self,
        path: &CollectionPath,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Applies `$set: patch` to the documents matching `query`.
    async fn update_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
        patch: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies `$set: patch` to the first match, creating it when nothing matches,
    /// and returns the document as it is after the update.
    async fn upsert_document(
        &self,
        path: &CollectionPath,
        query: &Query,
        patch: Document,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Returns the documents matching `query`, honouring sort, skip, limit and projection.
    async fn find_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Returns the first document matching `query`.
    ///
    /// The limit of `query` is ignored; sort, skip and projection apply.
    async fn find_document(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut single = query.clone();
        single.limit = Some(1);

        Ok(self
            .find_documents(path, &single)
            .await?
            .into_iter()
            .next())
    }

    /// Deletes every document matching `query` and returns how many were removed.
    async fn delete_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<u64>;

    /// Counts the documents matching `query`.
    async fn count_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<u64>;

    /// Runs an aggregation pipeline.
    async fn aggregate(
        &self,
        path: &CollectionPath,
        pipeline: &[Stage],
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with persistent storage or
    /// external connections should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder: Send {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
