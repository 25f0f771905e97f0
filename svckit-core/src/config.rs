//! Directory-tree config loading and typed binding.
//!
//! Every `*.toml` file found under the configured directories becomes a
//! *node* named after the file stem (`db.toml` → `db`), holding the file's
//! top-level keys. Files sharing a stem are merged key by key, later files
//! winning.
//!
//! Binding distinguishes an absent node from an absent key: the former means
//! "feature unconfigured" and binds nothing, the latter is
//! [`ConfigError::KeyNotFound`].
//!
//! # Example
//!
//! ```ignore
//! use svckit::config::{ConfigLoader, Section};
//!
//! #[derive(serde::Deserialize)]
//! struct Mongo { url: String }
//!
//! impl Section for Mongo {
//!     const NODE: &'static str = "db";
//!     const KEY: &'static str = "mongo";
//! }
//!
//! let config = ConfigLoader::new().path("./config").validate::<Mongo>().load()?;
//! let mongo: Option<Mongo> = config.section()?;
//! ```

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use serde::de::DeserializeOwned;
use toml::{Table, Value};

use crate::error::{ConfigError, ConfigResult};

static GLOBAL: OnceLock<ConfigStore> = OnceLock::new();

/// A typed config section located at `configs[NODE][KEY]`.
///
/// An empty `KEY` binds the whole node.
pub trait Section: DeserializeOwned {
    const NODE: &'static str;
    const KEY: &'static str;
}

/// Node → key → value mapping loaded from config files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigStore {
    nodes: BTreeMap<String, Table>,
}

impl ConfigStore {
    /// Loads every `*.toml` file under `paths`, recursively.
    ///
    /// Directories that cannot be read are skipped.
    pub fn load<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> ConfigResult<Self> {
        let mut store = Self::default();

        for path in paths {
            let path = path.as_ref();
            if !path.is_dir() {
                tracing::debug!(path = %path.display(), "skipping missing config directory");
                continue;
            }

            store.walk(path)?;
        }

        Ok(store)
    }

    fn walk(&mut self, dir: &Path) -> ConfigResult<()> {
        let io_error = |source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = fs::read_dir(dir)
            .map_err(io_error)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_error)?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                self.walk(&path)?;
            } else if path.extension().is_some_and(|ext| ext == "toml") {
                self.merge_file(&path)?;
            }
        }

        Ok(())
    }

    fn merge_file(&mut self, path: &Path) -> ConfigResult<()> {
        let Some(node) = path.file_stem().and_then(|stem| stem.to_str()) else {
            return Ok(());
        };

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = contents
            .parse::<Table>()
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!(path = %path.display(), node, keys = table.len(), "loaded config file");

        self.merge(node, table);

        Ok(())
    }

    /// Merges `table` into `node`, replacing keys that already exist.
    pub fn merge(&mut self, node: &str, table: Table) {
        self.nodes.entry(node.to_string()).or_default().extend(table);
    }

    /// Returns the raw table of a node.
    pub fn node(&self, node: &str) -> Option<&Table> {
        self.nodes.get(node)
    }

    /// Returns `true` when a file named after `node` was loaded.
    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// Names of every loaded node, sorted.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Converts `configs[node][key]` into `T`.
    ///
    /// An empty `key` binds the whole node.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` when the node does not exist
    /// * `Err(ConfigError::KeyNotFound)` when the node exists but the key does not
    /// * `Err(ConfigError::Decode)` when the value does not fit `T`
    pub fn bind<T: DeserializeOwned>(&self, node: &str, key: &str) -> ConfigResult<Option<T>> {
        let Some(table) = self.nodes.get(node) else {
            return Ok(None);
        };

        let value = if key.is_empty() {
            Value::Table(table.clone())
        } else {
            table
                .get(key)
                .cloned()
                .ok_or_else(|| ConfigError::KeyNotFound {
                    node: node.to_string(),
                    key: key.to_string(),
                })?
        };

        value
            .try_into()
            .map(Some)
            .map_err(|err: toml::de::Error| ConfigError::Decode {
                node: node.to_string(),
                key: key.to_string(),
                message: err.message().to_string(),
            })
    }

    /// In-place form of [`bind`](Self::bind). `target` is left untouched when the node is absent.
    pub fn bind_into<T: DeserializeOwned>(
        &self,
        node: &str,
        key: &str,
        target: &mut T,
    ) -> ConfigResult<()> {
        if let Some(value) = self.bind(node, key)? {
            *target = value;
        }

        Ok(())
    }

    /// Binds a typed section.
    pub fn section<S: Section>(&self) -> ConfigResult<Option<S>> {
        self.bind(S::NODE, S::KEY)
    }
}

fn validate_section<S: Section>(store: &ConfigStore) -> ConfigResult<()> {
    store.section::<S>().map(|_| ())
}

type Validator = fn(&ConfigStore) -> ConfigResult<()>;

/// Builder loading a [`ConfigStore`] and checking registered sections up front.
#[derive(Default)]
pub struct ConfigLoader {
    paths: Vec<PathBuf>,
    validators: Vec<Validator>,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("paths", &self.paths)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory to scan.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Adds several directories to scan, in order.
    pub fn paths<P: Into<PathBuf>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Requires section `S` to decode when present.
    ///
    /// An absent node still passes; an existing node missing `S::KEY` fails.
    pub fn validate<S: Section>(mut self) -> Self {
        self.validators.push(validate_section::<S>);
        self
    }

    /// Loads the files and runs every registered validation.
    pub fn load(self) -> ConfigResult<ConfigStore> {
        let store = ConfigStore::load(&self.paths)?;

        for validate in &self.validators {
            validate(&store)?;
        }

        Ok(store)
    }

    /// Loads into the process-wide store. See [`init`].
    pub fn init(self) -> ConfigResult<&'static ConfigStore> {
        if let Some(store) = GLOBAL.get() {
            return Ok(store);
        }

        let store = self.load()?;

        Ok(GLOBAL.get_or_init(|| store))
    }
}

/// Loads `paths` into the process-wide store.
///
/// Only the first successful call loads anything; later calls return the
/// already-initialised store.
pub fn init<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> ConfigResult<&'static ConfigStore> {
    ConfigLoader::new().paths(paths).init()
}

/// Returns the process-wide store, if [`init`] has run.
pub fn global() -> Option<&'static ConfigStore> {
    GLOBAL.get()
}
