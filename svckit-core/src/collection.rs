//! The fluent per-collection query handle.
//!
//! A [`CollectionHandle`] accumulates filter, sort, projection, pagination and
//! read-preference state through chained `&mut self` calls, then runs one of the
//! terminal operations against its backend. Documents pass through the
//! pre-create / pre-update transforms of [`Document`] on the way in and are
//! decoded with serde on the way out.
//!
//! Handles mutate in place: build a fresh one per logical operation and never
//! share one between concurrent queries.
//!
//! # Example
//!
//! ```ignore
//! use svckit::prelude::*;
//!
//! # async fn example(store: &DocumentStore<impl StoreBackend>) -> DocumentStoreResult<()> {
//! let settings: Vec<Setting> = store
//!     .collection("user_config")
//!     .filter(Filter::any_of("_id", vec!["a", "b"]))
//!     .fields("language, sub_lang")
//!     .sort("update_time", SortDirection::Desc)
//!     .limit(20)
//!     .find_many()
//!     .await?;
//! # Ok(()) }
//! ```

use std::{future::Future, time::Duration};

use bson::{Bson, de::deserialize_from_document};
use serde::de::DeserializeOwned;

use crate::{
    backend::{CollectionPath, StoreBackend, UpdateOptions, UpdateOutcome},
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    funcs::millis,
    query::{Expr, Filter, Projection, Query, ReadMode, Sort, SortDirection, Stage},
};

/// Deadline of single-document operations.
pub const POINT_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline of multi-document scans.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Mutable accumulator of query state for one logical collection operation.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct CollectionHandle<'a, B: StoreBackend> {
    backend: &'a B,
    path: CollectionPath,
    query: Query,
}

impl<'a, B: StoreBackend> CollectionHandle<'a, B> {
    pub(crate) fn new(backend: &'a B, path: CollectionPath) -> Self {
        Self {
            backend,
            path,
            query: Query::new(),
        }
    }

    /// Returns the collection this handle targets.
    pub fn path(&self) -> &CollectionPath {
        &self.path
    }

    /// Returns the accumulated query state.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Sets the filter, replacing any previous one.
    pub fn filter(&mut self, filter: impl Into<Expr>) -> &mut Self {
        self.query.filter = Some(filter.into());
        self
    }

    /// Caps the number of returned documents. `0` removes the cap.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.query.limit = (limit > 0).then_some(limit);
        self
    }

    /// Skips the first `skip` matching documents.
    pub fn skip(&mut self, skip: u64) -> &mut Self {
        self.query.skip = (skip > 0).then_some(skip);
        self
    }

    /// Appends a sort key.
    pub fn sort(&mut self, field: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Replaces all sort keys.
    pub fn sort_by(&mut self, keys: impl IntoIterator<Item = Sort>) -> &mut Self {
        self.query.sort = keys.into_iter().collect();
        self
    }

    /// Restricts the returned fields.
    ///
    /// Accepts a [`Projection`], a `{ field: 1 }` document or a comma-separated
    /// field list. An empty projection returns whole documents.
    pub fn fields(&mut self, projection: impl Into<Projection>) -> &mut Self {
        let projection = projection.into();
        self.query.projection = (!projection.is_empty()).then_some(projection);
        self
    }

    /// Sets the replica-set read preference.
    pub fn read_mode(&mut self, mode: ReadMode) -> &mut Self {
        self.query.read_mode = Some(mode);
        self
    }

    async fn deadline<T>(
        &self,
        operation: &'static str,
        after: Duration,
        future: impl Future<Output = DocumentStoreResult<T>>,
    ) -> DocumentStoreResult<T> {
        tokio::time::timeout(after, future)
            .await
            .map_err(|_| DocumentStoreError::Timeout {
                operation,
                collection: self.path.to_string(),
                after,
            })?
    }

    fn by_id(&self, id: impl Into<Bson>) -> Query {
        Query {
            filter: Some(Filter::id(id)),
            ..self.query.clone()
        }
    }

    /// Inserts one document after the pre-create transform and returns its identifier.
    pub async fn insert_one<D>(&self, document: &D) -> DocumentStoreResult<Bson>
    where
        D: Document + ?Sized,
    {
        let stored = document.before_create(millis())?;

        self.insert_one_raw(stored).await
    }

    /// Inserts a document exactly as given, without identifier or timestamp injection.
    pub async fn insert_one_raw(&self, document: bson::Document) -> DocumentStoreResult<Bson> {
        let ids = self
            .deadline(
                "insert_one",
                POINT_TIMEOUT,
                self.backend.insert_documents(&self.path, vec![document]),
            )
            .await?;

        ids.into_iter().next().ok_or_else(|| {
            DocumentStoreError::Backend(format!("insert into {} returned no identifier", self.path))
        })
    }

    /// Inserts documents after the pre-create transform and returns their identifiers in order.
    pub async fn insert_many<D>(&self, documents: &[D]) -> DocumentStoreResult<Vec<Bson>>
    where
        D: Document,
    {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let now = millis();
        let stored = documents
            .iter()
            .map(|document| document.before_create(now))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        let ids = self
            .deadline(
                "insert_many",
                POINT_TIMEOUT,
                self.backend.insert_documents(&self.path, stored),
            )
            .await?;

        tracing::debug!(collection = %self.path, count = ids.len(), "inserted documents");

        Ok(ids)
    }

    async fn update_with(
        &self,
        operation: &'static str,
        query: &Query,
        patch: bson::Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let outcome = self
            .deadline(
                operation,
                POINT_TIMEOUT,
                self.backend.update_documents(&self.path, query, patch, options),
            )
            .await?;

        tracing::debug!(
            collection = %self.path,
            operation,
            matched = outcome.matched,
            modified = outcome.modified,
            "updated documents"
        );

        Ok(outcome)
    }

    /// Patches the first document matching the filter with the non-zero fields of `document`.
    pub async fn update_one<D>(&self, document: &D) -> DocumentStoreResult<UpdateOutcome>
    where
        D: Document + ?Sized,
    {
        let patch = document.before_update(millis())?;

        self.update_with("update_one", &self.query, patch, UpdateOptions::default())
            .await
    }

    /// Patches every document matching the filter.
    pub async fn update_many<D>(&self, document: &D) -> DocumentStoreResult<UpdateOutcome>
    where
        D: Document + ?Sized,
    {
        let patch = document.before_update(millis())?;
        let options = UpdateOptions { many: true, upsert: false };

        self.update_with("update_many", &self.query, patch, options)
            .await
    }

    /// Patches every matching document, creating one when nothing matches.
    pub async fn upsert_many<D>(&self, document: &D) -> DocumentStoreResult<UpdateOutcome>
    where
        D: Document + ?Sized,
    {
        let patch = document.before_update(millis())?;
        let options = UpdateOptions { many: true, upsert: true };

        self.update_with("upsert_many", &self.query, patch, options)
            .await
    }

    /// Patches the document with the given identifier.
    ///
    /// The handle's own filter is left untouched.
    pub async fn update_by_id<D>(
        &self,
        id: impl Into<Bson>,
        document: &D,
    ) -> DocumentStoreResult<UpdateOutcome>
    where
        D: Document + ?Sized,
    {
        let patch = document.before_update(millis())?;
        let query = self.by_id(id);

        self.update_with("update_by_id", &query, patch, UpdateOptions::default())
            .await
    }

    /// Patches the first matching document, creating it when nothing matches,
    /// and returns the document as stored after the update.
    pub async fn upsert<D, T>(&self, document: &D) -> DocumentStoreResult<T>
    where
        D: Document + ?Sized,
        T: DeserializeOwned,
    {
        let patch = document.before_update(millis())?;
        let updated = self
            .deadline(
                "upsert",
                POINT_TIMEOUT,
                self.backend.upsert_document(&self.path, &self.query, patch),
            )
            .await?
            .ok_or_else(|| DocumentStoreError::NoMatchingDocument(self.path.to_string()))?;

        Ok(deserialize_from_document(updated)?)
    }

    async fn find_one_with<T>(&self, query: &Query) -> DocumentStoreResult<T>
    where
        T: DeserializeOwned,
    {
        let found = self
            .deadline(
                "find_one",
                POINT_TIMEOUT,
                self.backend.find_document(&self.path, query),
            )
            .await?
            .ok_or_else(|| DocumentStoreError::NoMatchingDocument(self.path.to_string()))?;

        Ok(deserialize_from_document(found)?)
    }

    /// Returns the first document matching the filter, honouring sort, skip and projection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NoMatchingDocument`] when nothing matches.
    pub async fn find_one<T>(&self) -> DocumentStoreResult<T>
    where
        T: DeserializeOwned,
    {
        self.find_one_with(&self.query).await
    }

    /// Returns the document with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NoMatchingDocument`] when no document has that identifier.
    pub async fn find_by_id<T>(&self, id: impl Into<Bson>) -> DocumentStoreResult<T>
    where
        T: DeserializeOwned,
    {
        let query = self.by_id(id);

        self.find_one_with(&query).await
    }

    /// Returns every document matching the accumulated query.
    pub async fn find_many<T>(&self) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.deadline(
            "find_many",
            SCAN_TIMEOUT,
            self.backend.find_documents(&self.path, &self.query),
        )
        .await?
        .into_iter()
        .map(|document| Ok(deserialize_from_document(document)?))
        .collect()
    }

    /// Deletes every document matching the filter and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnfilteredDelete`] without contacting the
    /// backend when the handle has no filter, or only an empty one.
    pub async fn delete(&self) -> DocumentStoreResult<u64> {
        if self.query.is_unfiltered() {
            tracing::warn!(collection = %self.path, "rejected delete without filter");

            return Err(DocumentStoreError::UnfilteredDelete(self.path.to_string()));
        }

        let deleted = self
            .deadline(
                "delete",
                POINT_TIMEOUT,
                self.backend.delete_documents(&self.path, &self.query),
            )
            .await?;

        tracing::debug!(collection = %self.path, deleted, "deleted documents");

        Ok(deleted)
    }

    /// Counts the documents matching the filter.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        self.deadline(
            "count",
            POINT_TIMEOUT,
            self.backend.count_documents(&self.path, &self.query),
        )
        .await
    }

    /// Runs an aggregation pipeline and decodes every output document.
    ///
    /// The handle's accumulated query state is not applied; express it as stages.
    pub async fn aggregate<T>(
        &self,
        pipeline: impl IntoIterator<Item = Stage>,
    ) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let pipeline = pipeline.into_iter().collect::<Vec<_>>();

        self.deadline(
            "aggregate",
            SCAN_TIMEOUT,
            self.backend.aggregate(&self.path, &pipeline),
        )
        .await?
        .into_iter()
        .map(|document| Ok(deserialize_from_document(document)?))
        .collect()
    }
}
