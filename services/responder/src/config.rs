//! Responder configuration
//!
//! Loaded through `common::load_config`, so every key can be overridden with
//! `RESPONDER_<SECTION>__<KEY>` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use common::{ConfigSource, LoggingConfig};
use errors::{ResponderError, ResponderResult};
use serde::{Deserialize, Serialize};

use crate::domain::PushSubscription;

pub const SERVICE_NAME: &str = "responder";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponderConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Response backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5020".to_string(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Poll channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Upper bound of random delay added before each fetch; 0 disables
    #[serde(default)]
    pub jitter_ms: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            jitter_ms: 0,
        }
    }
}

/// Alert lifecycle and display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Alerting reverts to idle after this long without dismissal
    #[serde(default = "default_expiry")]
    pub expiry_secs: u64,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl AlertConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            expiry_secs: default_expiry(),
            preview_chars: default_preview_chars(),
        }
    }
}

/// Push channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Application-server public key distributed by the backend
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default = "default_activation_timeout_ms")]
    pub activation_timeout_ms: u64,
    /// Subscription provisioned by the external push-delivery service
    #[serde(default)]
    pub subscription: Option<PushSubscription>,
}

impl PushConfig {
    pub fn activation_timeout(&self) -> Duration {
        Duration::from_millis(self.activation_timeout_ms)
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            public_key: None,
            activation_timeout_ms: default_activation_timeout_ms(),
            subscription: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverMode {
    /// `POST /geocode` on the response backend
    Backend,
    /// Geocoder plus radius search queried directly
    Direct,
}

/// Geospatial resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_mode")]
    pub mode: ResolverMode,
    #[serde(default = "default_radius_m")]
    pub radius_m: u32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,
    /// Radius-search mirrors, tried in order
    #[serde(default = "default_overpass_urls")]
    pub overpass_urls: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_resolver_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ResolverConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mode: default_resolver_mode(),
            radius_m: default_radius_m(),
            max_results: default_max_results(),
            geocoder_url: default_geocoder_url(),
            overpass_urls: default_overpass_urls(),
            user_agent: default_user_agent(),
            request_timeout_ms: default_resolver_timeout_ms(),
        }
    }
}

/// Persisted client state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/responder-state.json"),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    15
}

fn default_expiry() -> u64 {
    60
}

fn default_preview_chars() -> usize {
    100
}

fn default_activation_timeout_ms() -> u64 {
    5_000
}

fn default_resolver_mode() -> ResolverMode {
    ResolverMode::Backend
}

fn default_radius_m() -> u32 {
    5_000
}

fn default_max_results() -> usize {
    5
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_overpass_urls() -> Vec<String> {
    vec![
        "https://overpass-api.de/api/interpreter".to_string(),
        "https://overpass.kumi.systems/api/interpreter".to_string(),
        "https://maps.mail.ru/osm/tools/overpass/api/interpreter".to_string(),
    ]
}

fn default_user_agent() -> String {
    format!("Responder/{}", env!("CARGO_PKG_VERSION"))
}

fn default_resolver_timeout_ms() -> u64 {
    25_000
}

impl ResponderConfig {
    /// Load from defaults, config files and environment
    pub fn load(source: &ConfigSource) -> ResponderResult<Self> {
        let config: Self = common::load_config(SERVICE_NAME, source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ResponderResult<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ResponderError::config("backend.base_url must not be empty"));
        }
        if self.polling.interval_secs == 0 {
            return Err(ResponderError::config("polling.interval_secs must be > 0"));
        }
        if self.alerts.expiry_secs == 0 {
            return Err(ResponderError::config("alerts.expiry_secs must be > 0"));
        }
        if self.resolver.max_results == 0 {
            return Err(ResponderError::config("resolver.max_results must be > 0"));
        }
        if self.resolver.mode == ResolverMode::Direct && self.resolver.overpass_urls.is_empty() {
            return Err(ResponderError::config(
                "resolver.overpass_urls needs at least one mirror in direct mode",
            ));
        }
        Ok(())
    }

    /// Generate default configuration file
    pub fn generate_default_config() -> String {
        serde_yaml::to_string(&Self::default())
            .unwrap_or_else(|_| "# Failed to generate config file".to_string())
    }
}
