// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare DNS provider for the updater.
//
// ## Behavior
//
// - Managed records are selected by comment: every record in the zone whose
//   comment contains the configured filter is updated
// - One GET lists the records (first page only), one PATCH per record
//   updates `content`
// - A response with `success: false` is an error, for both the listing and
//   the update
// - No retry, backoff or caching: the engine re-runs the whole cycle on
//   its next tick
// - Dry-run mode performs the listing but only logs the PATCH requests
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider construction fails if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?comment.contains=...`
// - Patch DNS Record: PATCH `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use cfddns_core::config::{DEFAULT_CLOUDFLARE_API_BASE, ProviderConfig};
use cfddns_core::traits::{DnsProvider, DnsRecord, UpdateResult};
use cfddns_core::{Error, Result};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Error or message entry in a Cloudflare response envelope
#[derive(Debug, Clone, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl fmt::Display for ApiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Pagination block of a list response
#[derive(Debug, Default, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    page: u64,
    #[serde(default)]
    per_page: u64,
    #[serde(default)]
    total_count: u64,
}

/// Envelope of `GET /zones/:zone_id/dns_records`
#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    #[serde(default)]
    result: Option<Vec<DnsRecord>>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

/// Body of `PATCH /zones/:zone_id/dns_records/:record_id`
#[derive(Debug, Serialize)]
struct UpdateRecordRequest<'a> {
    content: &'a str,
}

/// Envelope of `PATCH /zones/:zone_id/dns_records/:record_id`
#[derive(Debug, Deserialize)]
struct UpdateRecordResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    result: Option<UpdatedRecord>,
}

#[derive(Debug, Deserialize)]
struct UpdatedRecord {
    content: String,
}

/// Cloudflare DNS provider
///
/// Bound to one zone, one comment filter and one API token.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform the record listing
/// - Log the intended PATCH payload
/// - **NOT** actually modify DNS records
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone the managed records live in
    zone_id: String,

    /// Substring matched against record comments
    filter: String,

    /// API base URL
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, list records but skip PATCH updates
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("filter", &self.filter)
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a live provider against the public Cloudflare API
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_id`: Zone the records live in
    /// - `filter`: Substring matched against each record's comment
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the token is empty or the HTTP client
    /// cannot be built.
    pub fn new(
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
        filter: impl Into<String>,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("cfddns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id: zone_id.into(),
            filter: filter.into(),
            api_base: DEFAULT_CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run: false,
        })
    }

    /// Create a provider from configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let provider = Self::new(
            config.auth_key.clone(),
            config.zone_identifier.clone(),
            config.filter.clone(),
        )?
        .with_api_base(config.api_base.clone())
        .with_dry_run(config.dry_run);

        if provider.dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(provider)
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Point the provider at a different API base (no trailing slash)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether updates are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, self.zone_id)
    }

    fn record_url(&self, record_id: &str) -> String {
        format!("{}/{}", self.records_url(), record_id)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// List the records whose comment contains the filter
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?comment.contains=<filter>
    /// Authorization: Bearer <token>
    /// ```
    async fn list_records(&self) -> Result<Vec<DnsRecord>> {
        tracing::debug!("Listing DNS records with comment containing {:?}", self.filter);

        let response = self
            .client
            .get(self.records_url())
            .query(&[("comment.contains", self.filter.as_str())])
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| Error::network(format!("HTTP request failed: {}", e)))?;

        let envelope: ListRecordsResponse = read_envelope(response, "DNS record query").await?;

        if !envelope.success {
            return Err(Error::provider(
                "cloudflare",
                format!("DNS record query rejected: {}", format_errors(&envelope.errors)),
            ));
        }

        for message in &envelope.messages {
            tracing::debug!("Cloudflare message: {}", message);
        }

        let records = envelope.result.unwrap_or_default();

        if let Some(info) = &envelope.result_info
            && info.total_count > records.len() as u64
        {
            tracing::warn!(
                "Cloudflare reports {} matching records but returned {} (page {}, {} per page); only these will be updated",
                info.total_count,
                info.count,
                info.page,
                info.per_page
            );
        }

        tracing::debug!("Found {} DNS record(s)", records.len());
        Ok(records)
    }

    /// Point one record at `new_ip`
    ///
    /// # API Call
    ///
    /// ```http
    /// PATCH /zones/:zone_id/dns_records/:record_id
    /// Authorization: Bearer <token>
    ///
    /// {"content": "1.2.3.4"}
    /// ```
    async fn update_record(&self, record: &DnsRecord, new_ip: Ipv4Addr) -> Result<UpdateResult> {
        let content = new_ip.to_string();
        let url = self.record_url(&record.id);

        tracing::info!(
            "Updating record {} with new ip {} [mode: {}]",
            record.name,
            content,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PATCH request to {} with payload: {}",
                url,
                serde_json::json!({ "content": content })
            );
            return Ok(UpdateResult::DryRun {
                record_name: record.name.clone(),
                new_content: content,
            });
        }

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, "application/json")
            .json(&UpdateRecordRequest { content: &content })
            .send()
            .await
            .map_err(|e| Error::network(format!("HTTP request failed: {}", e)))?;

        let envelope: UpdateRecordResponse = read_envelope(response, "DNS record update").await?;

        if !envelope.success {
            return Err(Error::provider(
                "cloudflare",
                format!(
                    "Update of {} rejected: {}",
                    record.name,
                    format_errors(&envelope.errors)
                ),
            ));
        }

        let new_content = envelope.result.map(|r| r.content).unwrap_or(content);
        tracing::info!("Updated DNS record {} -> {}", record.name, new_content);

        Ok(UpdateResult::Updated {
            record_name: record.name.clone(),
            previous_content: record.content.clone(),
            new_content,
        })
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Read and decode a response envelope
///
/// Cloudflare answers most failures with a JSON envelope too, so the body
/// is decoded regardless of status. Only an undecodable body on an error
/// status is reported by status code.
async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response, action: &str) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::network(format!("Failed to read {} response: {}", action, e)))?;

    match serde_json::from_str(&body) {
        Ok(envelope) => Ok(envelope),
        Err(e) if status.is_success() => Err(Error::decode(format!(
            "Failed to parse {} response: {}",
            action, e
        ))),
        Err(_) => Err(status_error(status, action, &body)),
    }
}

/// Map an HTTP error status to a provider error
fn status_error(status: StatusCode, action: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::provider(
            "cloudflare",
            format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
        ),
        404 => Error::provider(
            "cloudflare",
            format!("{} failed: zone or record not found. Status: {}", action, status),
        ),
        429 => Error::provider(
            "cloudflare",
            format!("Rate limit exceeded. Please retry later. Status: {}", status),
        ),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider(
            "cloudflare",
            format!("{} failed: {} - {}", action, status, body),
        ),
    }
}

fn format_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("[{}]", joined.join(", "))
}
