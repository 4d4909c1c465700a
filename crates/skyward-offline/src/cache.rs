//! Offline fallback cache.
//!
//! Static assets are served cache-first. API data is fetched network-first;
//! when the network fails the last stored copy is served whether it is fresh
//! or stale. Expired entries stay servable until the sweeper removes them.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use skyward_core::Config;

use crate::error::OfflineError;
use crate::kind::ResourceKind;
use crate::network::{HttpNetwork, Network, NetworkResponse};
use crate::store::{OfflineAsset, OfflineStore, ResourceMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within the resource kind's max-age.
    Fresh,
    /// Past max-age but not yet swept.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache(Freshness),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineResponse {
    pub body: Vec<u8>,
    pub content_type: String,
    pub source: ResponseSource,
}

impl OfflineResponse {
    fn from_network(response: NetworkResponse) -> Self {
        Self {
            body: response.body,
            content_type: response.content_type,
            source: ResponseSource::Network,
        }
    }

    fn from_cache(asset: OfflineAsset, freshness: Freshness) -> Self {
        Self {
            body: asset.body,
            content_type: asset.content_type,
            source: ResponseSource::Cache(freshness),
        }
    }

    pub fn is_live(&self) -> bool {
        self.source == ResponseSource::Network
    }
}

pub struct OfflineCache<N> {
    store: Arc<Mutex<OfflineStore>>,
    network: N,
}

impl<N: Network> OfflineCache<N> {
    pub fn new(store: OfflineStore, network: N) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            network,
        }
    }

    pub async fn fetch(&self, request_key: &str) -> Result<OfflineResponse, OfflineError> {
        self.fetch_at(request_key, Utc::now()).await
    }

    /// Serve `request_key` using the strategy for its resource kind.
    pub async fn fetch_at(
        &self,
        request_key: &str,
        now: DateTime<Utc>,
    ) -> Result<OfflineResponse, OfflineError> {
        let kind = ResourceKind::classify(request_key);
        if kind.is_api() {
            self.network_first(request_key, kind, now).await
        } else {
            self.cache_first(request_key, kind, now).await
        }
    }

    async fn cache_first(
        &self,
        request_key: &str,
        kind: ResourceKind,
        now: DateTime<Utc>,
    ) -> Result<OfflineResponse, OfflineError> {
        match self.lookup(request_key) {
            Ok(Some(asset)) => {
                tracing::debug!("Serving static asset from cache: {}", request_key);
                let freshness = freshness_of(asset.expires_at, now);
                return Ok(OfflineResponse::from_cache(asset, freshness));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Offline store unreadable for {}: {}", request_key, e),
        }

        let response = self.network.fetch(request_key).await?;
        self.remember(request_key, kind, &response, now);
        Ok(OfflineResponse::from_network(response))
    }

    async fn network_first(
        &self,
        request_key: &str,
        kind: ResourceKind,
        now: DateTime<Utc>,
    ) -> Result<OfflineResponse, OfflineError> {
        match self.network.fetch(request_key).await {
            Ok(response) => {
                self.remember(request_key, kind, &response, now);
                Ok(OfflineResponse::from_network(response))
            }
            Err(e) => {
                tracing::warn!("Network failed for {}, trying offline copy: {}", request_key, e);
                let asset = self.lookup(request_key)?.ok_or_else(|| OfflineError::NoData {
                    request_key: request_key.to_string(),
                })?;

                let expires_at = self
                    .metadata(request_key)?
                    .map_or(asset.expires_at, |meta| meta.expires_at);
                Ok(OfflineResponse::from_cache(asset, freshness_of(expires_at, now)))
            }
        }
    }

    /// Store a live response. A failed write only costs the offline copy.
    fn remember(
        &self,
        request_key: &str,
        kind: ResourceKind,
        response: &NetworkResponse,
        now: DateTime<Utc>,
    ) {
        let asset = OfflineAsset {
            request_key: request_key.to_string(),
            body: response.body.clone(),
            content_type: response.content_type.clone(),
            stored_at: now,
            expires_at: now + kind.max_age(),
        };
        if let Err(e) = self.store.lock().put(&asset, kind.is_api()) {
            tracing::warn!("Failed to store {} for offline use: {}", request_key, e);
        }
    }

    pub fn lookup(&self, request_key: &str) -> Result<Option<OfflineAsset>, OfflineError> {
        Ok(self.store.lock().get(request_key)?)
    }

    pub fn metadata(&self, request_key: &str) -> Result<Option<ResourceMeta>, OfflineError> {
        Ok(self.store.lock().metadata(request_key)?)
    }

    /// Remove every entry whose `expires_at` has passed, with its metadata.
    ///
    /// The store lock is taken once to list keys, then once per removal.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, OfflineError> {
        let expired = self.store.lock().expired_keys(now)?;

        let mut removed = 0;
        for key in &expired {
            if self.store.lock().remove(key)? {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Offline sweep removed {} expired entries", removed);
        }
        Ok(removed)
    }

    pub fn sweep(&self) -> Result<usize, OfflineError> {
        self.sweep_at(Utc::now())
    }

    /// Drop all stored resources and metadata.
    pub fn clear(&self) -> Result<usize, OfflineError> {
        let removed = self.store.lock().clear()?;
        tracing::info!("Cleared {} offline entries", removed);
        Ok(removed)
    }
}

impl OfflineCache<HttpNetwork> {
    /// Open the configured store, fronting the gateway at `server.bind_addr`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db_path = config.offline_db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let store = OfflineStore::open(&db_path)
            .with_context(|| format!("Failed to open offline store at {}", db_path.display()))?;
        let network = HttpNetwork::new(
            &format!("http://{}", config.server.bind_addr),
            std::time::Duration::from_secs(config.upstream.timeout_secs),
        )?;

        Ok(Self::new(store, network))
    }
}

fn freshness_of(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Freshness {
    if now < expires_at {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}
