//! Configuration types for the updater
//!
//! The daemon fills these from command-line flags; library users can build
//! them directly or deserialize them.

use serde::{Deserialize, Serialize};

/// Default public IP lookup endpoint
pub const DEFAULT_IP_LOOKUP_URL: &str = "https://api.ipify.org?format=json";

/// Cloudflare API v4 base URL
pub const DEFAULT_CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Main updater configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// IP lookup configuration
    #[serde(default)]
    pub ip_source: IpSourceConfig,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Poll loop settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DdnsConfig {
    /// Create a configuration with default lookup and engine settings
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            ip_source: IpSourceConfig::default(),
            provider,
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.ip_source.validate()?;
        self.provider.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// IP lookup configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSourceConfig {
    /// URL returning `{"ip": "<address>"}`
    #[serde(default = "default_ip_lookup_url")]
    pub url: String,
}

impl IpSourceConfig {
    /// Validate the lookup configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_http_url("IP lookup URL", &self.url)
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        Self {
            url: default_ip_lookup_url(),
        }
    }
}

/// Cloudflare provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Zone identifier the managed records live in
    pub zone_identifier: String,

    /// Substring matched against each record's comment
    pub filter: String,

    /// API token, sent as a bearer token
    /// ⚠️ NEVER log this value
    pub auth_key: String,

    /// Log intended updates instead of sending them
    #[serde(default)]
    pub dry_run: bool,

    /// API base URL (overridable for testing)
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("zone_identifier", &self.zone_identifier)
            .field("filter", &self.filter)
            .field("auth_key", &"<REDACTED>")
            .field("dry_run", &self.dry_run)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a live provider configuration against the public API
    pub fn new(
        zone_identifier: impl Into<String>,
        filter: impl Into<String>,
        auth_key: impl Into<String>,
    ) -> Self {
        Self {
            zone_identifier: zone_identifier.into(),
            filter: filter.into(),
            auth_key: auth_key.into(),
            dry_run: false,
            api_base: default_api_base(),
        }
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Point the provider at a different API base
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.zone_identifier.is_empty() {
            return Err(crate::Error::config("Zone identifier cannot be empty"));
        }
        if self.filter.is_empty() {
            return Err(crate::Error::config("Record filter cannot be empty"));
        }
        if self.auth_key.is_empty() {
            return Err(crate::Error::config("Cloudflare API token cannot be empty"));
        }
        validate_http_url("Cloudflare API base", &self.api_base)
    }
}

/// Poll loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Skip a tick while an earlier cycle is still running
    ///
    /// Off by default: every tick spawns its own cycle, and overlapping
    /// cycles queue on the poll state lock.
    #[serde(default)]
    pub skip_overlapping_ticks: bool,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Set the poll interval
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Enable or disable skipping ticks while a cycle is in flight
    pub fn with_skip_overlapping_ticks(mut self, skip: bool) -> Self {
        self.skip_overlapping_ticks = skip;
        self
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            skip_overlapping_ticks: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn validate_http_url(what: &str, url: &str) -> Result<(), crate::Error> {
    if url.is_empty() {
        return Err(crate::Error::config(format!("{} cannot be empty", what)));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(crate::Error::config(format!(
            "{} must use HTTP or HTTPS scheme. Got: {}",
            what, url
        )));
    }
    Ok(())
}

fn default_ip_lookup_url() -> String {
    DEFAULT_IP_LOOKUP_URL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_CLOUDFLARE_API_BASE.to_string()
}

fn default_poll_interval_secs() -> u64 {
    120
}

fn default_event_channel_capacity() -> usize {
    1000
}
