// # HTTP IP Source
//
// This crate provides the public IP lookup for the updater.
//
// ## Architecture
//
// One GET per lookup to an IP-echo service that answers with JSON
// (`{"ip": "203.0.113.7"}`), by default `https://api.ipify.org?format=json`.
// No caching and no retries: the engine asks again on its next tick.
//
// The HTTP client keeps reqwest's default timeouts.

use cfddns_core::config::IpSourceConfig;
use cfddns_core::traits::IpSource;
use cfddns_core::{Error, Result};

use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::net::Ipv4Addr;

/// ipify's JSON endpoint
pub const IPIFY_JSON_URL: &str = cfddns_core::config::DEFAULT_IP_LOOKUP_URL;

/// Body returned by the lookup service
#[derive(Debug, Deserialize)]
struct IpifyResponse {
    ip: String,
}

/// Public IP lookup against an ipify-compatible JSON endpoint
#[derive(Debug, Clone)]
pub struct IpifySource {
    /// URL to fetch the IP from
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl IpifySource {
    /// Create a source against the public ipify endpoint
    pub fn new() -> Self {
        Self::with_url(IPIFY_JSON_URL)
    }

    /// Create a source against a custom endpoint
    pub fn with_url(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cfddns/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            url: url.into(),
            client,
        }
    }

    /// Create a source from configuration
    pub fn from_config(config: &IpSourceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_url(config.url.clone()))
    }

    /// The URL this source queries
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the current IP from the lookup service
    async fn fetch_ip(&self) -> Result<Ipv4Addr> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::network(format!("IP lookup request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::provider(
                "ipify",
                format!("IP lookup returned HTTP {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read IP lookup response: {}", e)))?;

        parse_ip_response(&body)
    }
}

impl Default for IpifySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IpSource for IpifySource {
    async fn current(&self) -> Result<Ipv4Addr> {
        let ip = self.fetch_ip().await?;
        tracing::debug!("Public IP is {}", ip);
        Ok(ip)
    }

    fn source_name(&self) -> &'static str {
        "ipify"
    }
}

/// Decode `{"ip": "<address>"}` into an IPv4 address
fn parse_ip_response(body: &str) -> Result<Ipv4Addr> {
    let response: IpifyResponse = serde_json::from_str(body)?;
    let ip_text = response.ip.trim();

    ip_text
        .parse()
        .map_err(|_| Error::decode(format!("Invalid IPv4 address: {:?}", ip_text)))
}
