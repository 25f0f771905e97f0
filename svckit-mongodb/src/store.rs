use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{
        ClientOptions, CollectionOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
        ReadPreference, ReturnDocument, SelectionCriteria,
    },
};
use svckit_core::{
    backend::{CollectionPath, StoreBackend, StoreBackendBuilder, UpdateOptions, UpdateOutcome},
    document::ID_KEY,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Query, ReadMode, Stage},
};

use crate::{
    query::{MongoQueryTranslator, sort_document, stage_document, to_i64},
    settings::MongoSettings,
};

const DUPLICATE_KEY: i32 = 11000;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(url: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(MongoSettings::new(url, database))
    }

    /// Returns the driver client for operations the store does not cover.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, path: &CollectionPath, read_mode: Option<ReadMode>) -> MongoCollection<Document> {
        let database = self
            .client
            .database(path.database.as_deref().unwrap_or(&self.database));

        let mut options = CollectionOptions::default();
        options.selection_criteria = read_mode.map(|mode| SelectionCriteria::ReadPreference(read_preference(mode)));

        database.collection_with_options(&path.collection, options)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

fn read_preference(mode: ReadMode) -> ReadPreference {
    match mode {
        ReadMode::Primary => ReadPreference::Primary,
        ReadMode::PrimaryPreferred => ReadPreference::PrimaryPreferred { options: Default::default() },
        ReadMode::Secondary => ReadPreference::Secondary { options: Default::default() },
        ReadMode::SecondaryPreferred => ReadPreference::SecondaryPreferred { options: Default::default() },
        ReadMode::Nearest => ReadPreference::Nearest { options: Default::default() },
    }
}

fn backend_error(error: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(error.to_string())
}

/// Index into the written batch of the first duplicate-key failure, if any.
fn duplicate_index(error: &MongoError) -> Option<usize> {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) if failure.code == DUPLICATE_KEY => Some(0),
        ErrorKind::Command(failure) if failure.code == DUPLICATE_KEY => Some(0),
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()?
            .iter()
            .find(|failure| failure.code == DUPLICATE_KEY)
            .map(|failure| failure.index),
        _ => None,
    }
}

/// Maps an insert failure, reporting identifier collisions as [`DocumentStoreError::DocumentAlreadyExists`].
fn write_error(error: MongoError, path: &CollectionPath, documents: &[Document]) -> DocumentStoreError {
    match duplicate_index(&error) {
        Some(index) => DocumentStoreError::DocumentAlreadyExists(
            documents
                .get(index)
                .and_then(|document| document.get(ID_KEY))
                .map(Bson::to_string)
                .unwrap_or_default(),
            path.to_string(),
        ),
        None => backend_error(error),
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(
        &self,
        path: &CollectionPath,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let count = documents.len();
        let mut result = self
            .get_collection(path, None)
            .insert_many(&documents)
            .await
            .map_err(|e| write_error(e, path, &documents))?;

        (0..count)
            .map(|index| {
                result.inserted_ids.remove(&index).ok_or_else(|| {
                    DocumentStoreError::Backend(format!("no identifier reported for document {index}"))
                })
            })
            .collect()
    }

    async fn update_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
        patch: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let collection = self.get_collection(path, None);
        let filter = MongoQueryTranslator::filter(query)?;
        let update = doc! { "$set": patch };

        let result = match options.many {
            true => collection.update_many(filter, update).upsert(options.upsert).await,
            false => collection.update_one(filter, update).upsert(options.upsert).await,
        }
        .map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn upsert_document(
        &self,
        path: &CollectionPath,
        query: &Query,
        patch: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut options = FindOneAndUpdateOptions::default();
        options.upsert = Some(true);
        options.return_document = Some(ReturnDocument::After);
        options.sort = sort_document(&query.sort);
        options.projection = query.projection.as_ref().map(|projection| projection.to_document());

        self.get_collection(path, None)
            .find_one_and_update(MongoQueryTranslator::filter(query)?, doc! { "$set": patch })
            .with_options(options)
            .await
            .map_err(backend_error)
    }

    async fn find_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.limit = query.limit.map(to_i64).transpose()?;
        options.skip = query.skip;
        options.sort = sort_document(&query.sort);
        options.projection = query.projection.as_ref().map(|projection| projection.to_document());

        self.get_collection(path, query.read_mode)
            .find(MongoQueryTranslator::filter(query)?)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn find_document(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.skip = query.skip;
        options.sort = sort_document(&query.sort);
        options.projection = query.projection.as_ref().map(|projection| projection.to_document());

        self.get_collection(path, query.read_mode)
            .find_one(MongoQueryTranslator::filter(query)?)
            .with_options(options)
            .await
            .map_err(backend_error)
    }

    async fn delete_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<u64> {
        Ok(self
            .get_collection(path, None)
            .delete_many(MongoQueryTranslator::filter(query)?)
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn count_documents(
        &self,
        path: &CollectionPath,
        query: &Query,
    ) -> DocumentStoreResult<u64> {
        self.get_collection(path, query.read_mode)
            .count_documents(MongoQueryTranslator::filter(query)?)
            .await
            .map_err(backend_error)
    }

    async fn aggregate(
        &self,
        path: &CollectionPath,
        pipeline: &[Stage],
    ) -> DocumentStoreResult<Vec<Document>> {
        let pipeline = pipeline
            .iter()
            .map(stage_document)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.get_collection(path, None)
            .aggregate(pipeline)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

pub struct MongoDbStoreBuilder {
    settings: MongoSettings,
}

impl MongoDbStoreBuilder {
    pub fn new(settings: MongoSettings) -> Self {
        Self { settings }
    }

    async fn connect(options: ClientOptions) -> DocumentStoreResult<Client> {
        let client = Client::with_options(options)
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        tokio::time::timeout(
            CONNECT_TIMEOUT,
            client.database("admin").run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| DocumentStoreError::Initialization(format!("no reply to ping within {CONNECT_TIMEOUT:?}")))?
        .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        Ok(client)
    }
}

impl From<MongoSettings> for MongoDbStoreBuilder {
    fn from(settings: MongoSettings) -> Self {
        Self::new(settings)
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let client = Self::connect(self.settings.client_options().await?).await?;

        tracing::info!(database = %self.settings.database, "connected to mongodb");

        Ok(MongoDbStore::new(client, self.settings.database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_modes_map_to_driver_preferences() {
        assert!(matches!(read_preference(ReadMode::Primary), ReadPreference::Primary));
        assert!(matches!(
            read_preference(ReadMode::SecondaryPreferred),
            ReadPreference::SecondaryPreferred { .. }
        ));
        assert!(matches!(read_preference(ReadMode::Nearest), ReadPreference::Nearest { .. }));
    }
}
