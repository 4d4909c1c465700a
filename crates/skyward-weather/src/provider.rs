//! HTTP client for the upstream weather provider (weatherapi.com).

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use skyward_core::error::ReqwestErrorExt;
use skyward_core::{ConfigError, UpstreamConfig};
use tracing::instrument;

use crate::error::GatewayError;
use crate::request::UpstreamRequest;
use crate::types::*;

/// Provider error code for "No matching location found".
const NO_MATCHING_LOCATION: i64 = 1006;

/// Used when a provider 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

pub struct WeatherApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherApiClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            config.api_key().map(str::to_string),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Perform one provider call and normalize the payload.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch(&self, request: &UpstreamRequest) -> Result<GatewayData, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            tracing::error!("Weather API key is not configured");
            GatewayError::Configuration(ConfigError::Missing("upstream.api_key".into()))
        })?;

        let url = self.url_for(request, api_key);
        tracing::debug!("Calling provider for {}", request.kind());

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.into_network_error()))?;

        let payload = self.handle_response(request, response).await?;
        normalize(request, payload)
    }

    fn url_for(&self, request: &UpstreamRequest, api_key: &str) -> String {
        let key = urlencoding::encode(api_key);
        match request {
            UpstreamRequest::Current { q } => format!(
                "{}/current.json?key={}&q={}&aqi=yes",
                self.base_url,
                key,
                urlencoding::encode(q)
            ),
            UpstreamRequest::Forecast { q, days } => format!(
                "{}/forecast.json?key={}&q={}&days={}&aqi=yes&alerts=yes",
                self.base_url,
                key,
                urlencoding::encode(q),
                days
            ),
            UpstreamRequest::History { q, from, to } => {
                let mut url = format!(
                    "{}/history.json?key={}&q={}&dt={}",
                    self.base_url,
                    key,
                    urlencoding::encode(q),
                    from.format("%Y-%m-%d")
                );
                if let Some(to) = to {
                    url.push_str(&format!("&end_dt={}", to.format("%Y-%m-%d")));
                }
                url
            }
            UpstreamRequest::Search { q } => format!(
                "{}/search.json?key={}&q={}",
                self.base_url,
                key,
                urlencoding::encode(q)
            ),
            UpstreamRequest::ReverseGeocode { lat, lon } => format!(
                "{}/current.json?key={}&q={:.4},{:.4}",
                self.base_url, key, lat, lon
            ),
        }
    }

    /// Map provider status codes onto gateway errors.
    async fn handle_response(
        &self,
        request: &UpstreamRequest,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, GatewayError> {
        let status = response.status();

        if status.is_success() {
            return response.json().await.map_err(|e| GatewayError::Upstream {
                status: None,
                message: format!("Malformed provider payload: {}", e.without_url()),
                detail: None,
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            let text = response.text().await.unwrap_or_default();
            tracing::warn!("Provider rate limited us, retry after {}s", retry_after);
            return Err(GatewayError::UpstreamRateLimited {
                retry_after,
                detail: provider_error(&text).and_then(|e| e.message),
            });
        }

        let text = response.text().await.unwrap_or_default();
        let provider = provider_error(&text);

        if request.kind() == EndpointKind::ReverseGeocode {
            if let Some(ProviderErrorDetail {
                code: Some(NO_MATCHING_LOCATION),
                message,
            }) = &provider
            {
                return Err(GatewayError::NotFound(
                    message.clone().unwrap_or_else(|| "No matching location found".into()),
                ));
            }
        }

        tracing::warn!("Provider returned {} for {}", status, request.kind());
        Err(GatewayError::Upstream {
            status: Some(status.as_u16()),
            message: format!("Provider returned {}", status),
            detail: provider.and_then(|e| e.message),
        })
    }
}

impl std::fmt::Debug for WeatherApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherApiClient")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

fn provider_error(text: &str) -> Option<ProviderErrorDetail> {
    serde_json::from_str::<ProviderErrorBody>(text)
        .ok()
        .map(|body| body.error)
}

fn malformed(what: &str, e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Upstream {
        status: None,
        message: format!("Malformed {} payload: {}", what, e),
        detail: None,
    }
}

/// Reshape a provider payload into the gateway's output schema.
fn normalize(request: &UpstreamRequest, payload: serde_json::Value) -> Result<GatewayData, GatewayError> {
    match request {
        UpstreamRequest::Current { .. }
        | UpstreamRequest::Forecast { .. }
        | UpstreamRequest::History { .. } => Ok(GatewayData::Weather(payload)),
        UpstreamRequest::Search { .. } => {
            let locations: Vec<ProviderLocation> =
                serde_json::from_value(payload).map_err(|e| malformed("search", e))?;
            Ok(GatewayData::Locations(
                locations.into_iter().map(LocationSummary::from).collect(),
            ))
        }
        UpstreamRequest::ReverseGeocode { lat, lon } => {
            let envelope: ProviderLocationEnvelope =
                serde_json::from_value(payload).map_err(|e| malformed("geocode", e))?;
            let loc = envelope
                .location
                .ok_or_else(|| GatewayError::NotFound(format!("{:.4},{:.4}", lat, lon)))?;

            Ok(GatewayData::Location(GeocodedLocation {
                name: loc.name,
                region: loc.region,
                country: loc.country,
                lat: loc.lat,
                lon: loc.lon,
                localtime: loc.localtime.unwrap_or_default(),
            }))
        }
    }
}
