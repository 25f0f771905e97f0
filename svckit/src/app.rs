//! Service start-up: config, then logging, then the store and cache.
//!
//! Components whose config section is absent stay unconfigured. Components
//! that fail to connect are logged and stay unavailable; the service keeps
//! running and [`App::store`] / [`App::cache`] report
//! [`ServiceError::Unavailable`].

use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;

use svckit_core::{
    config::{ConfigLoader, ConfigStore},
    error::{ConfigError, LogError},
    log::{self, LogSettings},
    status::{self, StatusCode},
};

#[cfg(any(feature = "mongodb", feature = "redis"))]
use svckit_core::config::Section;
#[cfg(feature = "mongodb")]
use svckit_core::{backend::StoreBackendBuilder, store::DocumentStore};
#[cfg(feature = "mongodb")]
use svckit_mongodb::{MongoDbStore, MongoDbStoreBuilder, MongoSettings};

#[cfg(feature = "redis")]
use svckit_core::cache::Cache;
#[cfg(feature = "redis")]
use svckit_redis::{RedisCache, RedisSettings};

/// Errors raised while starting or using the service components.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Log(#[from] LogError),
    /// The component is unconfigured or failed to connect at start-up.
    #[error("{0} is not available")]
    Unavailable(&'static str),
}

impl StatusCode for ServiceError {
    fn status_code(&self) -> i32 {
        status::SYS_ERR
    }
}

#[derive(Debug)]
pub struct AppBuilder {
    config_paths: Vec<PathBuf>,
    logging: bool,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self {
            config_paths: Vec::new(),
            logging: true,
        }
    }
}

impl AppBuilder {
    /// Adds directories scanned for `*.toml` config files.
    pub fn config_paths<P: Into<PathBuf>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.config_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Skips installing the global log subscriber, e.g. when the host already has one.
    pub fn without_logging(mut self) -> Self {
        self.logging = false;
        self
    }

    /// Starts every configured component in order.
    ///
    /// # Errors
    ///
    /// Fails when the config tree cannot be read or a present section is
    /// malformed, or when log files cannot be opened. Connection failures are
    /// not errors here.
    pub async fn start(self) -> Result<App, ServiceError> {
        let config = ConfigLoader::new()
            .paths(self.config_paths)
            .validate::<LogSettings>()
            .load()?;

        let log_guard = if self.logging {
            start_logging(&config)?
        } else {
            None
        };

        #[cfg(feature = "mongodb")]
        let store = start_store(&config).await?;
        #[cfg(feature = "redis")]
        let cache = start_cache(&config).await?;

        tracing::info!(nodes = ?config.nodes().collect::<Vec<_>>(), "service started");

        Ok(App {
            config,
            #[cfg(feature = "mongodb")]
            store,
            #[cfg(feature = "redis")]
            cache,
            _log_guard: log_guard,
        })
    }
}

fn start_logging(config: &ConfigStore) -> Result<Option<WorkerGuard>, ServiceError> {
    let settings = config.section::<LogSettings>()?.unwrap_or_default();

    match log::init(&settings) {
        Ok(guard) => Ok(guard),
        Err(LogError::AlreadyInitialized(reason)) => {
            tracing::debug!(%reason, "keeping the installed log subscriber");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Binds a component section. A missing node or key leaves the component unconfigured.
#[cfg(any(feature = "mongodb", feature = "redis"))]
fn configured<S: Section>(config: &ConfigStore, component: &str) -> Result<Option<S>, ServiceError> {
    match config.section::<S>() {
        Ok(Some(settings)) => Ok(Some(settings)),
        Ok(None) => {
            tracing::info!(component, "not configured");
            Ok(None)
        }
        Err(err) if err.is_key_not_found() => {
            tracing::info!(component, "not configured");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(feature = "mongodb")]
async fn start_store(config: &ConfigStore) -> Result<Option<DocumentStore<MongoDbStore>>, ServiceError> {
    let Some(settings) = configured::<MongoSettings>(config, "mongodb")? else {
        return Ok(None);
    };

    match MongoDbStoreBuilder::new(settings).build().await {
        Ok(backend) => Ok(Some(DocumentStore::new(backend))),
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to mongodb");
            Ok(None)
        }
    }
}

#[cfg(feature = "redis")]
async fn start_cache(config: &ConfigStore) -> Result<Option<Cache<RedisCache>>, ServiceError> {
    let Some(settings) = configured::<RedisSettings>(config, "redis")? else {
        return Ok(None);
    };

    match RedisCache::connect(&settings).await {
        Ok(backend) => Ok(Some(Cache::new(backend))),
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to redis");
            Ok(None)
        }
    }
}

/// The started service components.
#[derive(Debug)]
pub struct App {
    config: ConfigStore,
    #[cfg(feature = "mongodb")]
    store: Option<DocumentStore<MongoDbStore>>,
    #[cfg(feature = "redis")]
    cache: Option<Cache<RedisCache>>,
    _log_guard: Option<WorkerGuard>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    #[cfg(feature = "mongodb")]
    pub fn store(&self) -> Result<&DocumentStore<MongoDbStore>, ServiceError> {
        self.store.as_ref().ok_or(ServiceError::Unavailable("mongodb"))
    }

    #[cfg(feature = "redis")]
    pub fn cache(&self) -> Result<&Cache<RedisCache>, ServiceError> {
        self.cache.as_ref().ok_or(ServiceError::Unavailable("redis"))
    }
}
