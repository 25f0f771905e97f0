//! In-memory storage implementation for document stores.
//!
//! Documents are kept per collection in insertion order behind an async-aware
//! read-write lock, and every query is a full scan.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;

use svckit_core::{
    backend::{CollectionPath, StoreBackend, StoreBackendBuilder, UpdateOptions, UpdateOutcome},
    document::ID_KEY,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query, Stage},
};

use crate::evaluator::{DocumentEvaluator, assign, compare_by, project};

type StoreMap = HashMap<CollectionPath, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Limitations
///
/// Queries scan all documents in a collection (no indexing). Raw filter and
/// pipeline documents are rejected with
/// [`UnsupportedQuery`](DocumentStoreError::UnsupportedQuery).
///
/// # Example
///
/// ```ignore
/// use svckit_memory::InMemoryStore;
/// use svckit::store::DocumentStore;
///
/// let store = DocumentStore::new(InMemoryStore::new());
/// let id = store.collection("users").insert_one(&doc! { "name": "Alice" }).await?;
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder
    }
}

/// Positions of the documents matching `filter`, in insertion order.
fn matching(documents: &[Document], filter: Option<&Expr>) -> DocumentStoreResult<Vec<usize>> {
    let mut positions = Vec::new();

    for (position, document) in documents.iter().enumerate() {
        if DocumentEvaluator::matches(document, filter)? {
            positions.push(position);
        }
    }

    Ok(positions)
}

/// Runs filter, sort, skip, limit and projection against a collection.
fn select(documents: &[Document], query: &Query) -> DocumentStoreResult<Vec<Document>> {
    let mut selected = matching(documents, query.filter.as_ref())?
        .into_iter()
        .map(|position| &documents[position])
        .collect::<Vec<_>>();

    if !query.sort.is_empty() {
        selected.sort_by(|a, b| compare_by(a, b, &query.sort));
    }

    Ok(selected
        .into_iter()
        .skip(query.skip.unwrap_or(0) as usize)
        .take(query.limit.map_or(usize::MAX, |limit| limit as usize))
        .map(|document| match &query.projection {
            Some(projection) => project(document.clone(), projection),
            None => document.clone(),
        })
        .collect())
}

/// Applies a `$set` patch to a copy and reports whether the document changed.
///
/// Callers write the copy back only once every matched document patched cleanly.
fn apply_patch(
    document: &mut Document,
    patch: &Document,
    path: &CollectionPath,
) -> DocumentStoreResult<bool> {
    let before = document.clone();

    for (key, value) in patch {
        if key == ID_KEY {
            if document.get(ID_KEY).is_some_and(|id| id != value) {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "the _id of a document in {path} cannot be changed"
                )));
            }
            continue;
        }
        assign(document, key, value.clone());
    }

    Ok(*document != before)
}

/// Builds the document created by an upsert: filter equalities overlaid with the patch.
fn seed(query: &Query, patch: &Document) -> Document {
    let mut document = Document::new();

    if let Some(filter) = &query.filter {
        for (key, value) in filter.equalities() {
            assign(&mut document, key, value.clone());
        }
    }
    for (key, value) in patch {
        assign(&mut document, key, value.clone());
    }
    with_id(document)
}

fn with_id(mut document: Document) -> Document {
    if !document.contains_key(ID_KEY) {
        document.insert(ID_KEY, ObjectId::new());
    }
    document
}

fn id_of(document: &Document) -> Bson {
    document.get(ID_KEY).cloned().unwrap_or(Bson::Null)
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(
        &self,
        path: &CollectionPath,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let mut store = self.store.write().await;
        let collection = store.entry(path.clone()).or_default();
        let mut ids = Vec::with_capacity(documents.len());

        for document in documents {
            let document = with_id(document);
            let id = id_of(&document);

            if collection.iter().any(|existing| id_of(existing) == id) {
                return Err(DocumentStoreError::DocumentAlreadyExists(
                    id.to_string(),
                    path.to_string(),
                ));
            }

            collection.push(document);
            ids.push(id);
        }

        Ok(ids)
    }

    async fn update_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
        patch: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let mut store = self.store.write().await;
        let collection = store.entry(path.clone()).or_default();

        let mut positions = matching(collection, query.filter.as_ref())?;
        if !options.many {
            positions.truncate(1);
        }

        let mut outcome = UpdateOutcome {
            matched: positions.len() as u64,
            ..UpdateOutcome::default()
        };

        let patched = positions
            .into_iter()
            .map(|position| {
                let mut document = collection[position].clone();
                let changed = apply_patch(&mut document, &patch, path)?;
                Ok((position, document, changed))
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        for (position, document, changed) in patched {
            if changed {
                collection[position] = document;
                outcome.modified += 1;
            }
        }

        if outcome.matched == 0 && options.upsert {
            let document = seed(query, &patch);
            outcome.upserted_id = Some(id_of(&document));
            collection.push(document);
        }

        Ok(outcome)
    }

    async fn upsert_document(
        &self,
        path: &CollectionPath,
        query: &Query,
        patch: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut store = self.store.write().await;
        let collection = store.entry(path.clone()).or_default();

        let first = select(collection, &Query {
            projection: None,
            limit: Some(1),
            ..query.clone()
        })?
        .into_iter()
        .next();

        let updated = match first.and_then(|found| {
            let id = id_of(&found);
            collection.iter().position(|document| id_of(document) == id)
        }) {
            Some(position) => {
                let mut document = collection[position].clone();
                apply_patch(&mut document, &patch, path)?;
                collection[position] = document.clone();
                document
            }
            None => {
                let document = seed(query, &patch);
                collection.push(document.clone());
                document
            }
        };

        Ok(Some(match &query.projection {
            Some(projection) => project(updated, projection),
            None => updated,
        }))
    }

    async fn find_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;

        match store.get(path) {
            Some(collection) => select(collection, query),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection) = store.get_mut(path) else {
            return Ok(0);
        };

        let positions = matching(collection, query.filter.as_ref())?;
        let mut position = 0;
        collection.retain(|_| {
            let keep = positions.binary_search(&position).is_err();
            position += 1;
            keep
        });

        Ok(positions.len() as u64)
    }

    async fn count_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;

        match store.get(path) {
            Some(collection) => Ok(matching(collection, query.filter.as_ref())?.len() as u64),
            None => Ok(0),
        }
    }

    async fn aggregate(
        &self,
        path: &CollectionPath,
        pipeline: &[Stage],
    ) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let mut documents = store.get(path).cloned().unwrap_or_default();

        for stage in pipeline {
            documents = match stage {
                Stage::Match(expr) => select(&documents, &Query {
                    filter: Some(expr.clone()),
                    ..Query::default()
                })?,
                Stage::Sort(keys) => {
                    documents.sort_by(|a, b| compare_by(a, b, keys));
                    documents
                }
                Stage::Skip(skip) => documents.into_iter().skip(*skip as usize).collect(),
                Stage::Limit(limit) => documents.into_iter().take(*limit as usize).collect(),
                Stage::Project(projection) => documents
                    .into_iter()
                    .map(|document| project(document, projection))
                    .collect(),
                Stage::Raw(_) => {
                    return Err(DocumentStoreError::UnsupportedQuery(
                        "raw pipeline stages need a database backend".to_string(),
                    ));
                }
            };
        }

        Ok(documents)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use svckit_core::query::{Filter, Projection, Sort};

    use super::*;

    fn users() -> CollectionPath {
        CollectionPath::new("users")
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_documents(
                &users(),
                vec![
                    doc! { "_id": "a", "name": "neo", "level": 3, "tags": ["one"] },
                    doc! { "_id": "b", "name": "trinity", "level": 5 },
                    doc! { "_id": "c", "name": "morpheus", "level": 5, "address": { "city": "zion" } },
                ],
            )
            .await
            .unwrap();
        store
    }

    fn query(filter: Expr) -> Query {
        Query {
            filter: Some(filter),
            ..Query::default()
        }
    }

    #[tokio::test]
    async fn insert_assigns_missing_ids_and_rejects_duplicates() {
        let store = seeded().await;

        let ids = store
            .insert_documents(&users(), vec![doc! { "name": "smith" }])
            .await
            .unwrap();
        assert!(matches!(ids[0], Bson::ObjectId(_)));

        let err = store
            .insert_documents(&users(), vec![doc! { "_id": "a" }])
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[tokio::test]
    async fn find_sorts_pages_and_projects() {
        let store = seeded().await;
        let query = Query {
            sort: vec![Sort::desc("level"), Sort::asc("name")],
            skip: Some(1),
            limit: Some(2),
            projection: Some(Projection::from_csv("name")),
            ..Query::default()
        };

        let found = store.find_documents(&users(), &query).await.unwrap();

        assert_eq!(
            found,
            vec![doc! { "_id": "b", "name": "trinity" }, doc! { "_id": "a", "name": "neo" }]
        );
    }

    #[tokio::test]
    async fn filters_follow_nested_paths_and_arrays() {
        let store = seeded().await;

        let by_city = store
            .count_documents(&users(), &query(Filter::eq("address.city", "zion")))
            .await
            .unwrap();
        let by_tag = store
            .count_documents(&users(), &query(Filter::eq("tags", "one")))
            .await
            .unwrap();
        let by_ids = store
            .count_documents(&users(), &query(Filter::any_of("_id", vec!["a", "c", "z"])))
            .await
            .unwrap();

        assert_eq!((by_city, by_tag, by_ids), (1, 1, 2));
    }

    #[tokio::test]
    async fn update_one_touches_first_match_only() {
        let store = seeded().await;

        let outcome = store
            .update_documents(
                &users(),
                &query(Filter::eq("level", 5)),
                doc! { "level": 6 },
                UpdateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!((outcome.matched, outcome.modified), (1, 1));
        let remaining = store
            .count_documents(&users(), &query(Filter::eq("level", 5)))
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn upsert_seeds_from_filter_equalities() {
        let store = seeded().await;
        let options = UpdateOptions { many: true, upsert: true };

        let outcome = store
            .update_documents(
                &users(),
                &query(Filter::eq("name", "smith").and(Filter::gt("level", 1))),
                doc! { "level": 9 },
                options,
            )
            .await
            .unwrap();

        assert_eq!(outcome.matched, 0);
        let id = outcome.upserted_id.unwrap();
        let created = store
            .find_document(&users(), &Query::by_id(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.get_str("name").unwrap(), "smith");
        assert_eq!(created.get_i32("level").unwrap(), 9);
    }

    #[tokio::test]
    async fn find_and_upsert_returns_document_after_update() {
        let store = seeded().await;

        let updated = store
            .upsert_document(&users(), &Query::by_id("b"), doc! { "level": 7 })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated, doc! { "_id": "b", "name": "trinity", "level": 7 });
    }

    #[tokio::test]
    async fn changing_id_is_rejected() {
        let store = seeded().await;

        let err = store
            .update_documents(
                &users(),
                &Query::by_id("a"),
                doc! { "_id": "z" },
                UpdateOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn failed_update_leaves_every_document_untouched() {
        let store = seeded().await;
        let before = store.find_documents(&users(), &Query::new()).await.unwrap();

        let err = store
            .update_documents(
                &users(),
                &query(Filter::eq("level", 5)),
                doc! { "name": "smith", "_id": "b" },
                UpdateOptions { many: true, upsert: false },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
        assert_eq!(store.find_documents(&users(), &Query::new()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn failed_find_and_upsert_keeps_the_document() {
        let store = seeded().await;

        let err = store
            .upsert_document(&users(), &Query::by_id("a"), doc! { "level": 8, "_id": "z" })
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
        let kept = store.find_document(&users(), &Query::by_id("a")).await.unwrap().unwrap();
        assert_eq!(kept.get_i32("level").unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_removes_matches() {
        let store = seeded().await;

        let deleted = store
            .delete_documents(&users(), &query(Filter::eq("level", 5)))
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(store.count_documents(&users(), &Query::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn aggregate_runs_typed_stages() {
        let store = seeded().await;

        let out = store
            .aggregate(
                &users(),
                &[
                    Stage::Match(Filter::gte("level", 4)),
                    Stage::Sort(vec![Sort::asc("name")]),
                    Stage::Limit(1),
                    Stage::Project(Projection::new().exclude("level").exclude("address")),
                ],
            )
            .await
            .unwrap();

        assert_eq!(out, vec![doc! { "_id": "c", "name": "morpheus" }]);
    }

    #[tokio::test]
    async fn raw_filters_are_unsupported() {
        let store = seeded().await;

        let err = store
            .find_documents(&users(), &query(Filter::raw(doc! { "level": { "$gt": 1 } })))
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::UnsupportedQuery(_)));
    }

    #[tokio::test]
    async fn collections_in_other_databases_are_separate() {
        let store = seeded().await;
        let other = CollectionPath::in_database("archive", "users");

        assert_eq!(store.count_documents(&other, &Query::new()).await.unwrap(), 0);
    }
}
