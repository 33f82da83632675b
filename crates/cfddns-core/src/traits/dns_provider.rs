// # DNS Provider Trait
//
// Defines the interface for finding the managed DNS records and pointing
// them at a new address.
//
// ## Implementations
//
// - Cloudflare: `cfddns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> cfddns_core::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let records = provider.list_records().await?;
//     provider
//         .update_records(&records, std::net::Ipv4Addr::new(203, 0, 113, 7))
//         .await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A DNS record as reported by the provider
///
/// Only `id`, `name` and `content` are interpreted. Everything else the
/// provider sends (timestamps, tags, zone linkage, ...) is kept in `extra`
/// so it survives a round trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned identifier
    pub id: String,
    /// Fully qualified hostname
    pub name: String,
    /// Current record value (the address for A records)
    pub content: String,
    /// Record type, e.g. "A"
    #[serde(rename = "type", default)]
    pub record_type: String,
    /// Whether the record is proxied by the provider
    #[serde(default)]
    pub proxied: bool,
    /// Free-form comment; the managed set is selected by matching against it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Provider metadata carried through but not interpreted
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DnsRecord {
    /// Create an A record with no metadata
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            record_type: "A".to_string(),
            proxied: false,
            comment: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach a comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Result of a single record update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// The provider accepted the new content
    Updated {
        /// The record name
        record_name: String,
        /// Content before the update, as returned by the query
        previous_content: String,
        /// Content the provider now reports
        new_content: String,
    },
    /// Dry-run mode: the request was logged but never sent
    DryRun {
        /// The record name
        record_name: String,
        /// Content that would have been written
        new_content: String,
    },
}

impl UpdateResult {
    /// The record this result refers to
    pub fn record_name(&self) -> &str {
        match self {
            UpdateResult::Updated { record_name, .. } | UpdateResult::DryRun { record_name, .. } => {
                record_name
            }
        }
    }

    /// The content the record now holds (or would hold, in dry-run mode)
    pub fn new_content(&self) -> &str {
        match self {
            UpdateResult::Updated { new_content, .. } | UpdateResult::DryRun { new_content, .. } => {
                new_content
            }
        }
    }

    /// Whether this update was only simulated
    pub fn is_dry_run(&self) -> bool {
        matches!(self, UpdateResult::DryRun { .. })
    }
}

/// Trait for DNS provider implementations
///
/// A provider is bound to one zone, one comment filter and one credential
/// at construction time. It performs one HTTP request per method call
/// (`update_records` aside, which is a sequential loop over
/// `update_record`) and never retries, caches or spawns tasks.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List the records whose comment contains the configured filter
    ///
    /// Only the first page the provider returns is used.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<DnsRecord>)`: The matching records, in provider order
    /// - `Err(Error)`: Transport, decode, or provider-reported failure
    async fn list_records(&self) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Point one record at `new_ip`
    ///
    /// # Returns
    ///
    /// - `Ok(UpdateResult)`: The provider reported success
    /// - `Err(Error)`: Transport, decode, or provider-reported failure
    async fn update_record(
        &self,
        record: &DnsRecord,
        new_ip: Ipv4Addr,
    ) -> Result<UpdateResult, crate::Error>;

    /// Point every record at `new_ip`, one at a time, in order
    ///
    /// Stops at the first failure and returns it. Records before the
    /// failing one keep their new content; there is no rollback.
    async fn update_records(
        &self,
        records: &[DnsRecord],
        new_ip: Ipv4Addr,
    ) -> Result<Vec<UpdateResult>, crate::Error> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.update_record(record, new_ip).await?);
        }
        Ok(results)
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
