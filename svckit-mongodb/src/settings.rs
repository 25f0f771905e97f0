//! Connection settings bound from the `db.mongo` config section.

use std::{path::PathBuf, time::Duration};

use mongodb::options::{ClientOptions, Credential, Tls, TlsOptions};
use serde::Deserialize;

use svckit_core::{
    config::Section,
    env::RunEnv,
    error::{DocumentStoreError, DocumentStoreResult},
    funcs::root_dir,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MongoSettings {
    pub url: String,
    pub database: String,
    /// Seconds an idle pooled connection is kept. `0` keeps the driver default.
    pub max_conn_idle_time: u64,
    /// `0` keeps the driver default.
    pub max_pool_size: u32,
    pub username: String,
    pub password: String,
    #[serde(rename = "replicaSet")]
    pub replica_set: String,
    pub is_ssl: bool,
    /// CA bundle path, relative to the executable's directory.
    pub ca_cert: String,
}

impl Section for MongoSettings {
    const NODE: &'static str = "db";
    const KEY: &'static str = "mongo";
}

impl MongoSettings {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        root_dir().join(&self.ca_cert)
    }

    /// Certificate verification is relaxed only for local runs.
    pub(crate) fn tls_options(&self, env: RunEnv) -> TlsOptions {
        let mut tls = TlsOptions::default();
        if !self.ca_cert.is_empty() {
            tls.ca_file_path = Some(self.ca_cert_path());
        }
        if env.is_local() {
            tls.allow_invalid_certificates = Some(true);
        }
        tls
    }

    /// Applies the settings on top of the options parsed from `url`.
    pub(crate) fn apply(&self, options: &mut ClientOptions, env: RunEnv) {
        if self.max_conn_idle_time > 0 {
            options.max_idle_time = Some(Duration::from_secs(self.max_conn_idle_time));
        }
        if self.max_pool_size > 0 {
            options.max_pool_size = Some(self.max_pool_size);
        }
        options.retry_reads = Some(true);
        options.retry_writes = Some(false);

        if !self.username.is_empty() && !self.password.is_empty() {
            let mut credential = Credential::default();
            credential.username = Some(self.username.clone());
            credential.password = Some(self.password.clone());
            options.credential = Some(credential);
        }
        if self.is_ssl {
            options.tls = Some(Tls::Enabled(self.tls_options(env)));
        }
        if !self.replica_set.is_empty() {
            options.repl_set_name = Some(self.replica_set.clone());
        }
    }

    /// Builds the driver options.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::Initialization`] when the URL does not
    /// parse or the configured CA bundle is missing.
    pub async fn client_options(&self) -> DocumentStoreResult<ClientOptions> {
        if self.is_ssl && !self.ca_cert.is_empty() && !self.ca_cert_path().is_file() {
            return Err(DocumentStoreError::Initialization(format!(
                "failed to read CA certificate {}",
                self.ca_cert_path().display()
            )));
        }

        let mut options = ClientOptions::parse(&self.url)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        self.apply(&mut options, RunEnv::current());

        Ok(options)
    }
}
