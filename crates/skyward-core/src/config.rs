use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable pointing at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "SKYWARD_CONFIG";
/// Environment variable holding the weather provider API key.
pub const API_KEY_ENV: &str = "WEATHER_API_KEY";
/// Environment variable overriding the weather provider base URL.
pub const BASE_URL_ENV: &str = "WEATHER_API_BASE_URL";
/// Environment variable overriding the HTTP bind address.
pub const BIND_ADDR_ENV: &str = "SKYWARD_BIND_ADDR";

/// Endpoint kinds that accept `[endpoints.<kind>]` overrides.
/// Longest cache TTL an endpoint may configure (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;
/// Longest rate-limit window an endpoint may configure (one day).
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

pub const ENDPOINT_KINDS: [&str; 5] = ["current", "forecast", "history", "search", "reverse_geocode"];

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a single-line message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the config file and default offline store
    pub config_dir: PathBuf,

    /// HTTP listener settings
    pub server: ServerConfig,

    /// Weather provider settings
    pub upstream: UpstreamConfig,

    /// Offline fallback cache settings
    #[serde(default)]
    pub offline: OfflineConfig,

    /// Gateway housekeeping settings
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Per-endpoint policy overrides, keyed by endpoint kind
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to, e.g. `127.0.0.1:3000`
    pub bind_addr: String,
}

impl ServerConfig {
    /// Parse the bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.bind_addr))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the weather provider API
    pub base_url: String,

    /// Provider API key. Usually supplied through `WEATHER_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Timeout for a single upstream call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl UpstreamConfig {
    /// Returns the API key if one is configured (not empty, not a placeholder).
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.starts_with("YOUR_"))
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.weatherapi.com/v1".to_string(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// SQLite file for the offline fallback cache (defaults to `<config_dir>/offline.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Interval between expiry sweeps, in minutes
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_minutes: u32,
}

fn default_sweep_interval() -> u32 {
    60
}

impl OfflineConfig {
    /// Sweep cadence, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_minutes > 0)
            .then(|| Duration::from_secs(u64::from(self.sweep_interval_minutes) * 60))
    }
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            sweep_interval_minutes: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Interval between cache purges and rate-limit window cleanup, in seconds
    #[serde(default = "default_maintenance_interval")]
    pub interval_secs: u64,
}

fn default_maintenance_interval() -> u64 {
    300
}

impl MaintenanceConfig {
    /// Housekeeping cadence, or `None` when disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_maintenance_interval(),
        }
    }
}

/// Optional overrides for one endpoint's cache and rate-limit policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOverride {
    pub ttl_secs: Option<u64>,
    pub cache_size: Option<usize>,
    pub max_per_window: Option<u32>,
    pub window_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = default_config_dir();

        Self {
            config_dir,
            server: ServerConfig {
                bind_addr: "127.0.0.1:3000".to_string(),
            },
            upstream: UpstreamConfig::default(),
            offline: OfflineConfig::default(),
            maintenance: MaintenanceConfig::default(),
            endpoints: BTreeMap::new(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skyward")
}

impl Config {
    /// Load configuration, creating a default file if none exists, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from an explicit path, writing defaults there if missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Apply `WEATHER_API_KEY`, `WEATHER_API_BASE_URL` and `SKYWARD_BIND_ADDR`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.upstream.api_key = Some(key);
        }
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.upstream.base_url = url;
        }
        if let Some(addr) = lookup(BIND_ADDR_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.bind_addr = addr;
        }
    }

    /// Path of the offline store database.
    pub fn offline_db_path(&self) -> PathBuf {
        self.offline
            .db_path
            .clone()
            .unwrap_or_else(|| self.config_dir.join("offline.db"))
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.upstream.base_url, "upstream.base_url", &mut result);

        if self.server.socket_addr().is_err() {
            result.add_error(
                "server.bind_addr",
                format!("Not a socket address: {}", self.server.bind_addr),
            );
        }

        if self.upstream.timeout_secs == 0 {
            result.add_error("upstream.timeout_secs", "Timeout must be greater than 0");
        } else if self.upstream.timeout_secs > 120 {
            result.add_warning(
                "upstream.timeout_secs",
                "Upstream timeout is unusually long (>120s)",
            );
        }

        // A missing key still lets the server start; requests answer 500.
        if self.upstream.api_key().is_none() {
            result.add_warning(
                "upstream.api_key",
                format!("No API key configured - set {} to enable upstream calls", API_KEY_ENV),
            );
        }

        if self.offline.sweep_interval_minutes == 0 {
            result.add_warning(
                "offline.sweep_interval_minutes",
                "Offline expiry sweep disabled (0 minutes)",
            );
        }

        if self.maintenance.interval_secs == 0 {
            result.add_warning("maintenance.interval_secs", "Gateway housekeeping disabled (0 seconds)");
        }

        for (kind, overrides) in &self.endpoints {
            let field = format!("endpoints.{}", kind);
            if !ENDPOINT_KINDS.contains(&kind.as_str()) {
                result.add_warning(&field, format!("Unknown endpoint kind '{}' is ignored", kind));
                continue;
            }
            if overrides.cache_size == Some(0) {
                result.add_error(format!("{}.cache_size", field), "Cache size must be greater than 0");
            }
            match overrides.window_secs {
                Some(0) => {
                    result.add_error(format!("{}.window_secs", field), "Window must be greater than 0")
                }
                Some(secs) if secs > MAX_WINDOW_SECS => result.add_error(
                    format!("{}.window_secs", field),
                    format!("Window must be at most {} seconds", MAX_WINDOW_SECS),
                ),
                _ => {}
            }
            if overrides.max_per_window == Some(0) {
                result.add_warning(
                    format!("{}.max_per_window", field),
                    "A limit of 0 rejects every request",
                );
            }
            match overrides.ttl_secs {
                Some(0) => {
                    result.add_warning(format!("{}.ttl_secs", field), "Caching disabled (0 seconds)")
                }
                Some(secs) if secs > MAX_TTL_SECS => result.add_error(
                    format!("{}.ttl_secs", field),
                    format!("TTL must be at most {} seconds", MAX_TTL_SECS),
                ),
                _ => {}
            }
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if let Some(port) = url.port() {
                    if port == 0 {
                        result.add_error(field_name, "Port cannot be 0");
                    }
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("skyward");

        Ok(config_dir.join("config.toml"))
    }
}
