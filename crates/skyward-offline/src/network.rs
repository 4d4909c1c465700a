//! Network side of the offline cache.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use skyward_core::error::ReqwestErrorExt;
use skyward_core::NetworkError;

/// A live response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    pub body: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait Network: Send + Sync {
    /// Fetch `request_key` from the network. Non-success statuses are errors.
    async fn fetch(&self, request_key: &str) -> Result<NetworkResponse, NetworkError>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    async fn fetch(&self, request_key: &str) -> Result<NetworkResponse, NetworkError> {
        (**self).fetch(request_key).await
    }
}

/// Fetches request keys from a running gateway over HTTP.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNetwork {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, request_key: &str) -> String {
        if request_key.starts_with("http://") || request_key.starts_with("https://") {
            request_key.to_string()
        } else {
            format!("{}/{}", self.base_url, request_key.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request_key: &str) -> Result<NetworkResponse, NetworkError> {
        let response = self
            .client
            .get(self.url_for(request_key))
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body: message,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let body = response
            .bytes()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        Ok(NetworkResponse {
            body: body.to_vec(),
            content_type,
        })
    }
}
