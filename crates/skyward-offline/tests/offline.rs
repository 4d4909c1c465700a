#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skyward_core::NetworkError;
use skyward_offline::{
    spawn_control_channel, spawn_sweeper, ControlMessage, ControlReply, Freshness, Network,
    NetworkResponse, OfflineCache, OfflineError, OfflineStore, ResponseSource,
};

/// Network double that can be switched off and counts calls.
#[derive(Default)]
struct FlakyNetwork {
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyNetwork {
    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FlakyNetwork {
    async fn fetch(&self, request_key: &str) -> Result<NetworkResponse, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Unreachable("offline".into()));
        }
        Ok(NetworkResponse {
            body: format!("live:{request_key}").into_bytes(),
            content_type: "application/json".into(),
        })
    }
}

fn cache() -> (Arc<OfflineCache<Arc<FlakyNetwork>>>, Arc<FlakyNetwork>) {
    let network = Arc::new(FlakyNetwork::default());
    let cache = OfflineCache::new(OfflineStore::in_memory().unwrap(), Arc::clone(&network));
    (Arc::new(cache), network)
}

fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::hours(hours)
}

const WEATHER: &str = "/api/weather?q=oslo";

#[tokio::test]
async fn api_data_is_network_first_and_recorded() {
    let (cache, network) = cache();

    let response = cache.fetch(WEATHER).await.unwrap();

    assert!(response.is_live());
    assert_eq!(network.calls(), 1);
    assert!(cache.lookup(WEATHER).unwrap().is_some());
    assert!(cache.metadata(WEATHER).unwrap().is_some());

    // Network is still preferred while online
    cache.fetch(WEATHER).await.unwrap();
    assert_eq!(network.calls(), 2);
}

#[tokio::test]
async fn offline_serves_fresh_copy() {
    let (cache, network) = cache();
    cache.fetch(WEATHER).await.unwrap();
    network.go_offline();

    let response = cache.fetch(WEATHER).await.unwrap();

    assert_eq!(response.source, ResponseSource::Cache(Freshness::Fresh));
    assert_eq!(response.body, format!("live:{WEATHER}").into_bytes());
}

#[tokio::test]
async fn offline_serves_stale_copy_rather_than_nothing() {
    let (cache, network) = cache();
    // Current weather is fresh for 15 minutes
    cache.fetch_at(WEATHER, hours_ago(2)).await.unwrap();
    network.go_offline();

    let response = cache.fetch(WEATHER).await.unwrap();

    assert_eq!(response.source, ResponseSource::Cache(Freshness::Stale));
}

#[tokio::test]
async fn offline_without_copy_is_no_data() {
    let (cache, network) = cache();
    network.go_offline();

    let err = cache.fetch("/api/locationSearch?query=oslo").await.unwrap_err();

    assert!(matches!(err, OfflineError::NoData { ref request_key } if request_key.contains("oslo")));
    assert!(err.is_offline());
}

#[tokio::test]
async fn static_assets_are_cache_first() {
    let (cache, network) = cache();

    let first = cache.fetch("/index.html").await.unwrap();
    let second = cache.fetch("/index.html").await.unwrap();

    assert!(first.is_live());
    assert_eq!(second.source, ResponseSource::Cache(Freshness::Fresh));
    assert_eq!(network.calls(), 1);
    assert!(cache.metadata("/index.html").unwrap().is_none());
}

#[tokio::test]
async fn static_asset_missing_while_offline_is_network_error() {
    let (cache, network) = cache();
    network.go_offline();

    let err = cache.fetch("/app.js").await.unwrap_err();

    assert!(matches!(err, OfflineError::Network(_)));
}

#[tokio::test]
async fn sweep_removes_expired_entry_and_metadata() {
    let (cache, _network) = cache();
    cache.fetch_at(WEATHER, hours_ago(1)).await.unwrap();
    cache.fetch("/api/reverseGeocode?lat=1&lon=2").await.unwrap();

    let removed = cache.sweep().unwrap();

    assert_eq!(removed, 1);
    assert!(cache.lookup(WEATHER).unwrap().is_none());
    assert!(cache.metadata(WEATHER).unwrap().is_none());
    assert!(cache.lookup("/api/reverseGeocode?lat=1&lon=2").unwrap().is_some());
}

#[tokio::test]
async fn background_sweeper_evicts_on_its_own_timer() {
    let (cache, _network) = cache();
    cache.fetch_at(WEATHER, hours_ago(3)).await.unwrap();

    let sweeper = spawn_sweeper(Arc::clone(&cache), Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(200)).await;
    sweeper.shutdown().await;

    assert!(cache.lookup(WEATHER).unwrap().is_none());
}

#[tokio::test]
async fn clear_caches_over_control_channel() {
    let (cache, _network) = cache();
    cache.fetch(WEATHER).await.unwrap();
    cache.fetch("/index.html").await.unwrap();

    let control = spawn_control_channel(Arc::clone(&cache));
    let reply = control.send(ControlMessage::ClearCaches).await.unwrap();

    assert_eq!(reply, ControlReply::CachesCleared { success: true });
    assert!(cache.lookup(WEATHER).unwrap().is_none());
    assert!(cache.lookup("/index.html").unwrap().is_none());

    let json = control.send_json(r#"{"type":"CLEAR_CACHES"}"#).await.unwrap();
    assert_eq!(json, r#"{"type":"CACHES_CLEARED","success":true}"#);
}

#[tokio::test]
async fn store_survives_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.db");
    let network = Arc::new(FlakyNetwork::default());

    {
        let cache = OfflineCache::new(OfflineStore::open(&path).unwrap(), Arc::clone(&network));
        cache.fetch(WEATHER).await.unwrap();
    }

    network.go_offline();
    let cache = OfflineCache::new(OfflineStore::open(&path).unwrap(), Arc::clone(&network));
    let response = cache.fetch(WEATHER).await.unwrap();
    assert!(!response.is_live());
}

#[tokio::test]
async fn from_config_creates_store_under_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = skyward_core::Config::default();
    config.config_dir = dir.path().join("skyward");

    let cache = skyward_offline::OfflineCache::from_config(&config).unwrap();

    assert!(config.offline_db_path().exists());
    assert!(cache.lookup(WEATHER).unwrap().is_none());
    assert_eq!(config.offline.sweep_interval(), Some(Duration::from_secs(3600)));
}

#[tokio::test]
async fn failed_store_write_still_returns_live_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.db");
    let network = Arc::new(FlakyNetwork::default());
    let cache = OfflineCache::new(OfflineStore::open(&path).unwrap(), Arc::clone(&network));

    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch("DROP TABLE resources;")
        .unwrap();

    let api = cache.fetch(WEATHER).await.unwrap();
    assert!(api.is_live());
    assert_eq!(api.body, format!("live:{WEATHER}").into_bytes());

    let asset = cache.fetch("/index.html").await.unwrap();
    assert!(asset.is_live());
    assert_eq!(network.calls(), 2);
}

#[tokio::test]
async fn health_is_never_pinned_in_cache() {
    let (cache, network) = cache();

    assert!(cache.fetch("/api/health").await.unwrap().is_live());
    assert!(cache.fetch("/api/health").await.unwrap().is_live());
    assert_eq!(network.calls(), 2);

    network.go_offline();
    let response = cache.fetch("/api/health").await.unwrap();
    assert_eq!(response.source, ResponseSource::Cache(Freshness::Stale));
}
