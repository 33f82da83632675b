// # IP Source Trait
//
// Defines the interface for looking up the current public IP address.
//
// ## Implementations
//
// - ipify JSON endpoint: `cfddns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use cfddns_core::IpSource;
//
// #[tokio::main]
// async fn main() -> cfddns_core::Result<()> {
//     let source = /* IpSource implementation */;
//     let ip = source.current().await?;
//     println!("public IP: {}", ip);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for public IP lookup implementations
///
/// A source performs exactly one lookup per call. It does not cache, poll,
/// or retry; the engine decides when to ask again.
///
/// Implementations must be thread-safe: overlapping ticks call `current()`
/// concurrently without any synchronization.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Look up the current public IPv4 address
    ///
    /// # Returns
    ///
    /// - `Ok(Ipv4Addr)`: The address reported by the lookup service
    /// - `Err(Error::Network)`: The service could not be reached
    /// - `Err(Error::Decode)`: The response body was not the expected shape
    async fn current(&self) -> Result<Ipv4Addr, crate::Error>;

    /// Name of the lookup service (for logging)
    fn source_name(&self) -> &'static str;
}
