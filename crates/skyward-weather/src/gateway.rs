//! Rate limit, then cache, then provider: the request path shared by every endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use skyward_core::Config;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{CacheStats, TtlCache, TtlJitter};
use crate::error::GatewayError;
use crate::policy::{EndpointPolicy, PolicyTable};
use crate::provider::WeatherApiClient;
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::request::{FetchParams, UpstreamRequest};
use crate::types::{EndpointKind, GatewayData};

/// Cache and limiter owned by one endpoint kind.
struct Lane {
    policy: EndpointPolicy,
    cache: TtlCache<GatewayData>,
    limiter: RateLimiter,
}

impl Lane {
    fn new(policy: EndpointPolicy, jitter: TtlJitter) -> Self {
        Self {
            cache: TtlCache::new(policy.cache_size, policy.ttl, jitter),
            limiter: RateLimiter::new(policy.max_per_window, policy.window),
            policy,
        }
    }
}

/// What one housekeeping pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_entries: usize,
    pub lapsed_clients: usize,
}

/// Process-wide gateway state. Construct once and share behind an `Arc`.
pub struct Gateway {
    lanes: [Lane; 5],
    client: WeatherApiClient,
}

impl Gateway {
    /// Gateway with round-robin TTL jitter.
    pub fn new(policies: PolicyTable, client: WeatherApiClient) -> Self {
        Self::build(policies, client, TtlJitter::round_robin)
    }

    /// Gateway whose caches always use the given jitter bucket.
    pub fn with_fixed_jitter(policies: PolicyTable, client: WeatherApiClient, bucket: u8) -> Self {
        Self::build(policies, client, || TtlJitter::Fixed(bucket))
    }

    fn build(policies: PolicyTable, client: WeatherApiClient, jitter: impl Fn() -> TtlJitter) -> Self {
        Self {
            lanes: EndpointKind::ALL.map(|kind| Lane::new(policies.get(kind).clone(), jitter())),
            client,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = WeatherApiClient::from_config(&config.upstream)?;
        if !client.has_api_key() {
            tracing::warn!("No weather API key configured; requests will fail until one is set");
        }
        Ok(Self::new(PolicyTable::from_config(config), client))
    }

    fn lane(&self, kind: EndpointKind) -> &Lane {
        &self.lanes[kind.index()]
    }

    /// Count a request from `client_id` against the endpoint's limiter.
    pub fn check_rate_limit(&self, kind: EndpointKind, client_id: &str) -> Result<(), GatewayError> {
        match self.lane(kind).limiter.check_and_record(client_id) {
            RateLimitDecision::Allowed { .. } => Ok(()),
            RateLimitDecision::Denied { retry_after_secs } => {
                tracing::warn!("Rate limited {} on {} for {}s", client_id, kind, retry_after_secs);
                Err(GatewayError::RateLimited {
                    retry_after: retry_after_secs,
                })
            }
        }
    }

    /// Full inbound request path: rate limit, then `fetch`.
    pub async fn handle(
        &self,
        kind: EndpointKind,
        client_id: &str,
        params: &FetchParams,
    ) -> Result<GatewayData, GatewayError> {
        self.check_rate_limit(kind, client_id)?;
        self.fetch(kind, params).await
    }

    /// Validate, consult the cache, and call the provider on a miss.
    ///
    /// Only successful responses are cached. Nothing is retried here.
    pub async fn fetch(&self, kind: EndpointKind, params: &FetchParams) -> Result<GatewayData, GatewayError> {
        let lane = self.lane(kind);
        let request = UpstreamRequest::from_params(kind, &lane.policy, params)?;

        if request.is_short_search() {
            return Ok(GatewayData::Locations(Vec::new()));
        }

        let key = request.cache_key();
        if let Some(data) = lane.cache.get(&key) {
            tracing::debug!("Cache hit: {}", key);
            return Ok(data);
        }
        tracing::debug!("Cache miss: {}", key);

        let data = self.client.fetch(&request).await?;
        lane.cache.set(key, data.clone());
        Ok(data)
    }

    /// Purge expired cache entries and forget lapsed rate-limit windows.
    pub fn maintain_at(&self, now: Instant) -> MaintenanceReport {
        self.lanes
            .iter()
            .fold(MaintenanceReport::default(), |mut report, lane| {
                report.expired_entries += lane.cache.purge_expired_at(now);
                report.lapsed_clients += lane.limiter.cleanup_at(now);
                report
            })
    }

    pub fn maintain(&self) -> MaintenanceReport {
        self.maintain_at(Instant::now())
    }

    pub fn cache_stats(&self) -> BTreeMap<&'static str, CacheStats> {
        EndpointKind::ALL
            .into_iter()
            .map(|kind| (kind.as_str(), self.lane(kind).cache.stats()))
            .collect()
    }
}

/// Handle for the background housekeeping task.
pub struct MaintenanceHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Run `maintain` every `every` until shut down.
    pub fn spawn(gateway: Arc<Gateway>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick fires immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = gateway.maintain();
                        tracing::debug!(
                            "Gateway maintenance purged {} entries, dropped {} clients",
                            report.expired_entries,
                            report.lapsed_clients
                        );
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self { shutdown_tx, task }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::warn!("Maintenance task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn offline_gateway() -> Gateway {
        let client = WeatherApiClient::new("http://127.0.0.1:1", None, Duration::from_secs(1)).unwrap();
        Gateway::with_fixed_jitter(PolicyTable::defaults(), client, 0)
    }

    #[test]
    fn test_limiters_are_per_endpoint() {
        let gateway = offline_gateway();

        for _ in 0..10 {
            assert!(gateway.check_rate_limit(EndpointKind::ReverseGeocode, "1.2.3.4").is_ok());
        }
        let denied = gateway.check_rate_limit(EndpointKind::ReverseGeocode, "1.2.3.4");
        assert!(matches!(denied, Err(GatewayError::RateLimited { retry_after }) if retry_after > 0));

        assert!(gateway.check_rate_limit(EndpointKind::Current, "1.2.3.4").is_ok());
    }

    #[tokio::test]
    async fn test_short_search_skips_everything() {
        let gateway = offline_gateway();
        let params = FetchParams::new().with("query", "lo");

        let data = gateway.fetch(EndpointKind::Search, &params).await.unwrap();

        assert_eq!(data, GatewayData::Locations(vec![]));
        assert_eq!(gateway.cache_stats()["search"].misses, 0);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_configuration_error() {
        let gateway = offline_gateway();
        let params = FetchParams::new().with("q", "Oslo");

        let result = gateway.fetch(EndpointKind::Current, &params).await;

        assert!(matches!(result, Err(GatewayError::Configuration(_))));
        assert_eq!(gateway.cache_stats()["current"].len, 0);
    }

    #[test]
    fn test_maintain_drops_lapsed_windows() {
        let gateway = offline_gateway();
        gateway.check_rate_limit(EndpointKind::Current, "a").unwrap();
        gateway.check_rate_limit(EndpointKind::Search, "b").unwrap();

        let report = gateway.maintain_at(Instant::now() + Duration::from_secs(61));

        assert_eq!(report.lapsed_clients, 2);
        assert_eq!(report.expired_entries, 0);
    }

    #[test]
    fn test_cache_stats_cover_every_kind() {
        let stats = offline_gateway().cache_stats();
        assert_eq!(stats.len(), 5);
        assert_eq!(stats["reverse_geocode"].capacity, 1000);
    }
}
