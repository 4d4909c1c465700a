//! Parameter validation and cache-key derivation for upstream calls.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::GatewayError;
use crate::policy::EndpointPolicy;
use crate::types::EndpointKind;

pub const DEFAULT_FORECAST_DAYS: u8 = 3;
pub const MAX_FORECAST_DAYS: u8 = 14;

/// Search queries shorter than this return no results without an upstream call.
pub const MIN_SEARCH_QUERY_CHARS: usize = 3;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw query parameters of an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchParams {
    values: HashMap<String, String>,
}

impl FetchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Parameters for a reverse geocode lookup.
    pub fn coordinates(lat: f64, lon: f64) -> Self {
        Self::new().with("lat", lat.to_string()).with("lon", lon.to_string())
    }

    /// Trimmed value of `name`. Blank values count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl From<HashMap<String, String>> for FetchParams {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

/// A validated provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamRequest {
    Current {
        q: String,
    },
    Forecast {
        q: String,
        days: u8,
    },
    History {
        q: String,
        from: NaiveDate,
        to: Option<NaiveDate>,
    },
    Search {
        q: String,
    },
    /// Coordinates are already rounded to 4 decimal places.
    ReverseGeocode {
        lat: f64,
        lon: f64,
    },
}

impl UpstreamRequest {
    /// Validate `params` for `kind`. Fails before any network activity.
    pub fn from_params(
        kind: EndpointKind,
        policy: &EndpointPolicy,
        params: &FetchParams,
    ) -> Result<Self, GatewayError> {
        for name in policy.required_params {
            if params.get(name).is_none() {
                return Err(GatewayError::Validation(format!(
                    "Missing required parameter: {}",
                    name
                )));
            }
        }

        let query = |name: &str| params.get(name).unwrap_or_default().to_string();

        let request = match kind {
            EndpointKind::Current => Self::Current { q: query("q") },
            EndpointKind::Forecast => Self::Forecast {
                q: query("q"),
                days: parse_days(params.get("days"))?,
            },
            EndpointKind::History => {
                let from = parse_date("from", params.get("from"))?
                    .ok_or_else(|| GatewayError::Validation("Missing required parameter: from".into()))?;
                let to = parse_date("to", params.get("to"))?;
                if let Some(to) = to {
                    if to < from {
                        return Err(GatewayError::Validation(
                            "'to' must not be earlier than 'from'".into(),
                        ));
                    }
                }
                Self::History { q: query("q"), from, to }
            }
            EndpointKind::Search => Self::Search { q: query("query") },
            EndpointKind::ReverseGeocode => Self::ReverseGeocode {
                lat: round_coordinate(parse_coordinate("lat", params.get("lat"), 90.0)?),
                lon: round_coordinate(parse_coordinate("lon", params.get("lon"), 180.0)?),
            },
        };

        Ok(request)
    }

    pub fn kind(&self) -> EndpointKind {
        match self {
            Self::Current { .. } => EndpointKind::Current,
            Self::Forecast { .. } => EndpointKind::Forecast,
            Self::History { .. } => EndpointKind::History,
            Self::Search { .. } => EndpointKind::Search,
            Self::ReverseGeocode { .. } => EndpointKind::ReverseGeocode,
        }
    }

    /// Normalized key: lower-cased query, rounded coordinates, secondary params.
    pub fn cache_key(&self) -> String {
        let kind = self.kind();
        match self {
            Self::Current { q } | Self::Search { q } => {
                format!("{}:{}", kind, q.to_lowercase())
            }
            Self::Forecast { q, days } => format!("{}:{}:{}", kind, q.to_lowercase(), days),
            Self::History { q, from, to } => format!(
                "{}:{}:{}:{}",
                kind,
                q.to_lowercase(),
                from.format(DATE_FORMAT),
                to.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default()
            ),
            Self::ReverseGeocode { lat, lon } => format!("{}:{:.4},{:.4}", kind, lat, lon),
        }
    }

    /// Search queries too short to be worth sending upstream.
    pub fn is_short_search(&self) -> bool {
        matches!(self, Self::Search { q } if q.chars().count() < MIN_SEARCH_QUERY_CHARS)
    }
}

/// Round to 4 decimal places (about 11 m).
pub fn round_coordinate(value: f64) -> f64 {
    // Adding 0.0 folds -0.0 into 0.0 so both share a key
    (value * 10_000.0).round() / 10_000.0 + 0.0
}

fn parse_days(raw: Option<&str>) -> Result<u8, GatewayError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_FORECAST_DAYS);
    };

    let days: i64 = raw
        .parse()
        .map_err(|_| GatewayError::Validation(format!("Invalid days value: {}", raw)))?;
    let clamped = days.clamp(1, i64::from(MAX_FORECAST_DAYS));
    Ok(u8::try_from(clamped).unwrap_or(DEFAULT_FORECAST_DAYS))
}

fn parse_date(name: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, GatewayError> {
    raw.map(|value| {
        NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
            GatewayError::Validation(format!("Invalid {} date, expected YYYY-MM-DD", name))
        })
    })
    .transpose()
}

fn parse_coordinate(name: &str, raw: Option<&str>, limit: f64) -> Result<f64, GatewayError> {
    let raw = raw
        .ok_or_else(|| GatewayError::Validation(format!("Missing required parameter: {}", name)))?;

    let value: f64 = raw
        .parse()
        .map_err(|_| GatewayError::Validation(format!("Invalid {} value: {}", name, raw)))?;

    if !value.is_finite() || value.abs() > limit {
        return Err(GatewayError::Validation(format!(
            "{} must be between -{} and {}",
            name, limit, limit
        )));
    }
    Ok(value)
}
