//! Core traits for the updater
//!
//! - [`IpSource`]: Look up the current public IP
//! - [`DnsProvider`]: List the managed DNS records and patch them

pub mod dns_provider;
pub mod ip_source;

pub use dns_provider::{DnsProvider, DnsRecord, UpdateResult};
pub use ip_source::IpSource;
