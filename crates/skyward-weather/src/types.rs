use serde::{Deserialize, Serialize};

/// Logical weather-provider call served by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Current,
    Forecast,
    History,
    Search,
    ReverseGeocode,
}

impl EndpointKind {
    pub const ALL: [EndpointKind; 5] = [
        EndpointKind::Current,
        EndpointKind::Forecast,
        EndpointKind::History,
        EndpointKind::Search,
        EndpointKind::ReverseGeocode,
    ];

    /// Stable name used in config sections, cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Forecast => "forecast",
            Self::History => "history",
            Self::Search => "search",
            Self::ReverseGeocode => "reverse_geocode",
        }
    }

    /// Parse a config/log name back into a kind.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Parse the `endpoint` parameter of the weather route.
    ///
    /// Only the three weather kinds are reachable this way.
    pub fn from_weather_param(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "current" => Some(Self::Current),
            "forecast" => Some(Self::Forecast),
            "history" => Some(Self::History),
            _ => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Current => 0,
            Self::Forecast => 1,
            Self::History => 2,
            Self::Search => 3,
            Self::ReverseGeocode => 4,
        }
    }
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A location match returned by location search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub name: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

/// The place a coordinate pair resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedLocation {
    pub name: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub localtime: String,
}

/// Normalized payload handed back to callers and stored in the caches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GatewayData {
    /// Current, forecast or history payload as returned by the provider.
    Weather(serde_json::Value),
    /// Location search results.
    Locations(Vec<LocationSummary>),
    /// Reverse geocode result.
    Location(GeocodedLocation),
}

/// Location object as the provider reports it. Unknown fields are dropped.
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderLocation {
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub localtime: Option<String>,
}

impl From<ProviderLocation> for LocationSummary {
    fn from(loc: ProviderLocation) -> Self {
        Self {
            name: loc.name,
            region: loc.region,
            country: loc.country,
            lat: loc.lat,
            lon: loc.lon,
        }
    }
}

/// Envelope of a provider current-conditions response, reduced to the location.
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderLocationEnvelope {
    pub location: Option<ProviderLocation>,
}

/// Provider error body: `{"error": {"code": 1006, "message": "..."}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderErrorBody {
    pub error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProviderErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_endpoint_kind_names_round_trip() {
        for kind in EndpointKind::ALL {
            assert_eq!(EndpointKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EndpointKind::from_name("tides"), None);
    }

    #[test]
    fn test_endpoint_kind_indexes_are_distinct() {
        let mut seen = [false; 5];
        for kind in EndpointKind::ALL {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
    }

    #[test]
    fn test_weather_param_only_accepts_weather_kinds() {
        assert_eq!(EndpointKind::from_weather_param("current"), Some(EndpointKind::Current));
        assert_eq!(EndpointKind::from_weather_param(" Forecast "), Some(EndpointKind::Forecast));
        assert_eq!(EndpointKind::from_weather_param("history"), Some(EndpointKind::History));
        assert_eq!(EndpointKind::from_weather_param("search"), None);
        assert_eq!(EndpointKind::from_weather_param("reverse_geocode"), None);
    }

    #[test]
    fn test_provider_location_drops_extra_fields() {
        let loc: ProviderLocation = serde_json::from_value(serde_json::json!({
            "id": 2801268,
            "name": "London",
            "region": "City of London, Greater London",
            "country": "United Kingdom",
            "lat": 51.52,
            "lon": -0.11,
            "url": "london-city-of-london-greater-london-united-kingdom"
        }))
        .unwrap();

        let summary = LocationSummary::from(loc);
        let json = serde_json::to_value(&summary).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 5);
        assert!(!obj.contains_key("url"));
        assert!(!obj.contains_key("id"));
    }

    #[test]
    fn test_gateway_data_serializes_untagged() {
        let data = GatewayData::Locations(vec![]);
        assert_eq!(serde_json::to_string(&data).unwrap(), "[]");
    }
}
