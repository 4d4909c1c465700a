//! Declarative per-endpoint cache and rate-limit settings.

use std::time::Duration;

use skyward_core::{Config, EndpointOverride};

use crate::types::EndpointKind;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPolicy {
    pub ttl: Duration,
    pub cache_size: usize,
    pub max_per_window: u32,
    pub window: Duration,
    pub required_params: &'static [&'static str],
}

impl EndpointPolicy {
    /// Built-in settings, tuned to how quickly each kind of data goes stale.
    pub fn defaults_for(kind: EndpointKind) -> Self {
        let (ttl, cache_size, max_per_window) = match kind {
            EndpointKind::Current => (5 * MINUTE, 500, 30),
            EndpointKind::Forecast => (30 * MINUTE, 300, 30),
            EndpointKind::History => (DAY, 200, 20),
            EndpointKind::Search => (DAY, 1000, 20),
            // Coordinates-to-name mappings rarely change
            EndpointKind::ReverseGeocode => (7 * DAY, 1000, 10),
        };

        Self {
            ttl: Duration::from_secs(ttl),
            cache_size,
            max_per_window,
            window: Duration::from_secs(MINUTE),
            required_params: required_params(kind),
        }
    }

    /// Apply any fields set in a config override.
    pub fn with_override(mut self, overrides: &EndpointOverride) -> Self {
        if let Some(ttl) = overrides.ttl_secs {
            self.ttl = Duration::from_secs(ttl);
        }
        if let Some(size) = overrides.cache_size {
            self.cache_size = size;
        }
        if let Some(max) = overrides.max_per_window {
            self.max_per_window = max;
        }
        if let Some(window) = overrides.window_secs {
            self.window = Duration::from_secs(window);
        }
        self
    }
}

fn required_params(kind: EndpointKind) -> &'static [&'static str] {
    match kind {
        EndpointKind::Current | EndpointKind::Forecast => &["q"],
        EndpointKind::History => &["q", "from"],
        EndpointKind::Search => &["query"],
        EndpointKind::ReverseGeocode => &["lat", "lon"],
    }
}

/// One policy per endpoint kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: [EndpointPolicy; 5],
}

impl PolicyTable {
    pub fn defaults() -> Self {
        Self {
            policies: EndpointKind::ALL.map(EndpointPolicy::defaults_for),
        }
    }

    /// Defaults merged with the `[endpoints.<kind>]` sections of `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut table = Self::defaults();
        for (name, overrides) in &config.endpoints {
            match EndpointKind::from_name(name) {
                Some(kind) => {
                    let merged = table.get(kind).clone().with_override(overrides);
                    table.set(kind, merged);
                }
                None => tracing::warn!("Ignoring overrides for unknown endpoint kind '{}'", name),
            }
        }
        table
    }

    pub fn get(&self, kind: EndpointKind) -> &EndpointPolicy {
        &self.policies[kind.index()]
    }

    pub fn set(&mut self, kind: EndpointKind, policy: EndpointPolicy) {
        self.policies[kind.index()] = policy;
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::defaults()
    }
}
