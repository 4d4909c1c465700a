//! Caching, rate-limited gateway in front of the weather provider.
//!
//! Every endpoint kind gets its own TTL cache and rate limiter, configured
//! from a declarative [`PolicyTable`]. The [`Gateway`] ties them to the
//! provider client.

pub mod cache;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod provider;
pub mod rate_limit;
pub mod request;
pub mod types;

pub use cache::{CacheStats, TtlCache, TtlJitter};
pub use error::{ErrorBody, GatewayError};
pub use gateway::{Gateway, MaintenanceHandle, MaintenanceReport};
pub use policy::{EndpointPolicy, PolicyTable};
pub use provider::WeatherApiClient;
pub use rate_limit::{client_id_from_forwarded, RateLimitDecision, RateLimiter, UNKNOWN_CLIENT};
pub use request::{FetchParams, UpstreamRequest};
pub use types::*;
