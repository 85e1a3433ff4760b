//! Install/activate lifecycle for the caching agent.
//!
//! The agent moves through `Installing -> Waiting -> Activating -> Active`.
//! Install seeds the current version's store from the precache list as one
//! atomic batch; activate evicts every stale version's store and claims
//! the registered clients. A failed install leaves whatever was serving
//! before completely intact: the new version's store never comes into
//! existence.

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use offcache_core::cache::key::{canonicalize, request_key};
use offcache_core::{AppConfig, CacheStore, Entry, Error};

use crate::clients::ClientRegistry;
use crate::net::Network;

/// Lifecycle states of one agent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installing,
    Waiting,
    Activating,
    Active,
}

/// Drives install and activate transitions against the store.
pub struct Lifecycle {
    store: CacheStore,
    network: Arc<dyn Network>,
    config: Arc<AppConfig>,
    origin: Url,
    clients: ClientRegistry,
    state: LifecycleState,
    skip_requested: bool,
}

impl Lifecycle {
    pub fn new(
        store: CacheStore, network: Arc<dyn Network>, config: Arc<AppConfig>, clients: ClientRegistry,
    ) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            store,
            network,
            config,
            origin,
            clients,
            state: LifecycleState::Installing,
            skip_requested: false,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Seed the current version's store from the precache list.
    ///
    /// All-or-nothing: every resource is fetched first, then committed in
    /// one transaction. Any fetch failure (transport or non-ok status)
    /// aborts the install and no store exists for this version afterward.
    ///
    /// On success the agent waits, unless skip-waiting was requested, in
    /// which case it activates immediately.
    pub async fn install(&mut self) -> Result<(), Error> {
        if self.state != LifecycleState::Installing {
            return Err(Error::Lifecycle(format!("install not allowed from state {:?}", self.state)));
        }

        let version = &self.config.cache_name;
        tracing::info!(version = %version, resources = self.config.precache.len(), "installing");

        let stored_at = chrono::Utc::now().to_rfc3339();
        let mut entries = Vec::with_capacity(self.config.precache.len());
        for path in &self.config.precache {
            let url = self
                .origin
                .join(path)
                .map_err(|e| Error::PrecacheFailed(format!("{path}: {e}")))?;
            let url = canonicalize(url.as_str()).map_err(|e| Error::PrecacheFailed(format!("{path}: {e}")))?;

            let resp = self
                .network
                .get(&url)
                .await
                .map_err(|e| Error::PrecacheFailed(format!("{path}: {e}")))?;
            if !resp.ok() {
                return Err(Error::PrecacheFailed(format!("{path}: status {}", resp.status)));
            }

            entries.push(Entry {
                version: version.clone(),
                key: request_key("GET", &url),
                method: "GET".into(),
                url: url.to_string(),
                status: resp.status,
                status_text: resp.status_text,
                headers_json: serde_json::to_string(&resp.headers).ok(),
                body: resp.body.to_vec(),
                stored_at: stored_at.clone(),
            });
        }

        self.store.commit_version(version, &entries).await?;
        self.state = LifecycleState::Waiting;
        tracing::info!(version = %version, "installed, waiting");

        if self.skip_requested {
            self.activate().await?;
        }

        Ok(())
    }

    /// Evict every stale version's store and claim all clients.
    ///
    /// Deletion failures for individual stale versions are logged and do
    /// not block activation of the current version.
    pub async fn activate(&mut self) -> Result<(), Error> {
        match self.state {
            LifecycleState::Active => return Ok(()),
            LifecycleState::Installing => {
                return Err(Error::Lifecycle("cannot activate before install completes".into()));
            }
            LifecycleState::Waiting | LifecycleState::Activating => {}
        }

        self.state = LifecycleState::Activating;
        let current = &self.config.cache_name;
        tracing::info!(version = %current, "activating");

        let versions = self.store.list_versions().await?;
        for version in versions.iter().filter(|v| *v != current) {
            match self.store.delete_version(version).await {
                Ok(entries) => {
                    tracing::info!(version = %version, entries, "deleted stale cache version");
                }
                Err(e) => {
                    tracing::warn!(version = %version, error = %e, "failed to delete stale cache version");
                }
            }
        }

        let claimed = self.clients.claim();
        self.state = LifecycleState::Active;
        tracing::info!(version = %current, clients = claimed, "active");

        Ok(())
    }

    /// Handle a skip-waiting request.
    ///
    /// In `Waiting`, activates immediately. During an install, records the
    /// request so activation follows the moment install succeeds. A no-op
    /// once activating or active.
    pub async fn skip_waiting(&mut self) -> Result<(), Error> {
        match self.state {
            LifecycleState::Waiting => self.activate().await,
            LifecycleState::Installing => {
                tracing::debug!("skip-waiting requested during install");
                self.skip_requested = true;
                Ok(())
            }
            LifecycleState::Activating | LifecycleState::Active => Ok(()),
        }
    }
}
