//! Resource classification and per-kind max-age.

use chrono::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    StaticAsset,
    CurrentWeather,
    Forecast,
    History,
    LocationSearch,
    ReverseGeocode,
    /// Any other `/api/` route, such as health.
    OtherApi,
}

impl ResourceKind {
    /// Classify a request key (absolute URL or path with query).
    pub fn classify(request_key: &str) -> Self {
        let Some(url) = parse_key(request_key) else {
            return Self::StaticAsset;
        };

        match url.path().trim_end_matches('/') {
            "/api/weather" => {
                let endpoint = url
                    .query_pairs()
                    .find(|(name, _)| name == "endpoint")
                    .map(|(_, value)| value.to_ascii_lowercase());

                match endpoint.as_deref() {
                    Some("forecast") => Self::Forecast,
                    Some("history") => Self::History,
                    _ => Self::CurrentWeather,
                }
            }
            "/api/locationSearch" => Self::LocationSearch,
            "/api/reverseGeocode" => Self::ReverseGeocode,
            path if path.starts_with("/api/") => Self::OtherApi,
            _ => Self::StaticAsset,
        }
    }

    /// How long a stored copy counts as fresh.
    pub fn max_age(&self) -> Duration {
        match self {
            Self::StaticAsset => Duration::days(30),
            Self::CurrentWeather => Duration::minutes(15),
            Self::Forecast => Duration::hours(1),
            Self::History | Self::LocationSearch => Duration::hours(24),
            Self::ReverseGeocode => Duration::days(7),
            Self::OtherApi => Duration::zero(),
        }
    }

    /// API data is network-first and carries a metadata record.
    pub fn is_api(&self) -> bool {
        !matches!(self, Self::StaticAsset)
    }
}

fn parse_key(request_key: &str) -> Option<Url> {
    match Url::parse(request_key) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost")
            .ok()?
            .join(request_key)
            .ok(),
        Err(_) => None,
    }
}
