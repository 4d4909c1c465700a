//! Gateway error taxonomy.

use serde::Serialize;
use skyward_core::{ConfigError, NetworkError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or malformed input. Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The calling client exceeded its window for this endpoint.
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// The provider throttled us.
    #[error("Upstream rate limited, retry after {retry_after} seconds")]
    UpstreamRateLimited {
        retry_after: u64,
        detail: Option<String>,
    },

    /// Provider answered with a non-success status or an unreadable payload.
    #[error("Upstream error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
        detail: Option<String>,
    },

    #[error("Location not found: {0}")]
    NotFound(String),

    /// Missing API key or similar; fatal until the deployment is fixed.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Provider unreachable or timed out.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

impl GatewayError {
    /// HTTP status the gateway answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::RateLimited { .. } | Self::UpstreamRateLimited { .. } => 429,
            Self::NotFound(_) => 404,
            Self::Configuration(_) => 500,
            Self::Upstream { .. } | Self::Network(_) => 502,
        }
    }

    /// Seconds the caller should wait before retrying, when known.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } | Self::UpstreamRateLimited { retry_after, .. } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// Whether a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::UpstreamRateLimited { .. }
                | Self::Upstream { .. }
                | Self::Network(_)
        )
    }

    /// Client-facing message. Never includes provider internals.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::RateLimited { .. } => "Too many requests. Please try again later.".to_string(),
            Self::UpstreamRateLimited { .. } => {
                "Weather service rate limit exceeded. Please try again later.".to_string()
            }
            Self::Upstream { .. } => "Failed to fetch data from weather service".to_string(),
            Self::NotFound(_) => "Location not found".to_string(),
            Self::Configuration(e) => e.user_message().to_string(),
            Self::Network(e) => e.user_message().to_string(),
        }
    }

    /// JSON body for an error reply.
    pub fn body(&self) -> ErrorBody {
        let detail = match self {
            Self::UpstreamRateLimited { detail, .. } | Self::Upstream { detail, .. } => {
                detail.clone()
            }
            _ => None,
        };

        ErrorBody {
            error: self.user_message(),
            detail,
            retry_after: self.retry_after(),
        }
    }
}

/// `{error, detail?, retryAfter?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::Validation("q".into()).status_code(), 400);
        assert_eq!(GatewayError::RateLimited { retry_after: 5 }.status_code(), 429);
        assert_eq!(
            GatewayError::UpstreamRateLimited { retry_after: 60, detail: None }.status_code(),
            429
        );
        assert_eq!(GatewayError::NotFound("0,0".into()).status_code(), 404);
        assert_eq!(GatewayError::Configuration(ConfigError::Missing("upstream.api_key".into())).status_code(), 500);
        assert_eq!(
            GatewayError::Upstream { status: Some(500), message: String::new(), detail: None }
                .status_code(),
            502
        );
        assert_eq!(GatewayError::Network(NetworkError::Timeout).status_code(), 502);
    }

    #[test]
    fn test_retryable() {
        assert!(GatewayError::RateLimited { retry_after: 1 }.is_retryable());
        assert!(GatewayError::Network(NetworkError::Timeout).is_retryable());
        assert!(!GatewayError::Validation("x".into()).is_retryable());
        assert!(!GatewayError::Configuration(ConfigError::Missing("x".into())).is_retryable());
        assert!(!GatewayError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_rate_limited_body_carries_retry_after() {
        let body = GatewayError::RateLimited { retry_after: 42 }.body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["retryAfter"], 42);
        assert!(json.get("detail").is_none());
    }

    #[test]
    fn test_upstream_body_preserves_detail() {
        let err = GatewayError::Upstream {
            status: Some(500),
            message: "provider returned 500".into(),
            detail: Some("Internal application error.".into()),
        };
        let json = serde_json::to_value(err.body()).unwrap();
        assert_eq!(json["detail"], "Internal application error.");
        assert!(json.get("retryAfter").is_none());
    }

    #[test]
    fn test_configuration_body_hides_internals() {
        let err = GatewayError::Configuration(ConfigError::Missing("WEATHER_API_KEY".into()));
        assert_eq!(err.body().error, "Server configuration error");
    }
}
