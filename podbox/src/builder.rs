// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use podbox_core::{PrivateKey, PublicKey};
use podbox_store::PodboxStore;
use podbox_store::sqlite::{SqliteStore, SqliteStoreBuilder};

use crate::config::Config;
use crate::credential::{CredentialSubservice, ProofVerifier, SignatureVerifier};
use crate::engine::{Podbox, PodboxError};
use crate::pipeline::{LemonadeApi, PipelineContext, PretixApi};

pub struct PodboxBuilder {
    config: Config,
    store: SqliteStoreBuilder,
    verifier: Option<Arc<dyn ProofVerifier>>,
    pretix: Option<Arc<dyn PretixApi>>,
    lemonade: Option<Arc<dyn LemonadeApi>>,
}

impl Default for PodboxBuilder {
    fn default() -> Self {
        Self::from_config(Config::default())
    }
}

impl PodboxBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: Config) -> Self {
        let store = SqliteStoreBuilder::default()
            .database_url(&config.database_url)
            .max_connections(config.max_connections);
        PodboxBuilder {
            config,
            store,
            verifier: None,
            pretix: None,
            lemonade: None,
        }
    }

    pub fn signing_key(mut self, private_key: PrivateKey) -> Self {
        self.config.signing_key = Some(private_key);
        self
    }

    pub fn trusted_issuer(mut self, public_key: PublicKey) -> Self {
        self.config.trusted_issuer = Some(public_key);
        self
    }

    pub fn database_url(mut self, url: &str) -> Self {
        self.config.database_url = url.to_string();
        self.store = self.store.database_url(url);
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.config.max_connections = max_connections;
        self.store = self.store.max_connections(max_connections);
        self
    }

    pub fn default_migrations(mut self, value: bool) -> Self {
        self.store = self.store.run_default_migrations(value);
        self
    }

    pub fn verification_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.verification_cache_capacity = capacity;
        self
    }

    /// Replaces the default Ed25519 check of email claims.
    pub fn proof_verifier(mut self, verifier: Arc<dyn ProofVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn pretix_api(mut self, api: Arc<dyn PretixApi>) -> Self {
        self.pretix = Some(api);
        self
    }

    pub fn lemonade_api(mut self, api: Arc<dyn LemonadeApi>) -> Self {
        self.lemonade = Some(api);
        self
    }

    /// Spawns the engine on a SQLite database.
    pub async fn spawn(mut self) -> Result<Podbox<SqliteStore<'static>>, PodboxError> {
        let store = std::mem::take(&mut self.store).build().await?;
        Ok(self.spawn_with_store(store))
    }

    /// Spawns the engine on an already opened store.
    pub fn spawn_with_store<S>(self, store: S) -> Podbox<S>
    where
        S: PodboxStore,
    {
        let signing_key = self.config.signing_key.unwrap_or_default();
        let verifier = self
            .verifier
            .unwrap_or_else(|| Arc::new(SignatureVerifier));
        let credentials = CredentialSubservice::with_capacity(
            store.clone(),
            verifier,
            self.config.trusted_issuer,
            self.config.verification_cache_capacity,
        );

        Podbox::new(PipelineContext {
            store,
            signing_key,
            credentials: Arc::new(credentials),
            pretix: self.pretix,
            lemonade: self.lemonade,
        })
    }
}
