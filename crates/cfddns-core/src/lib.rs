// # cfddns-core
//
// Core library for the polling Cloudflare dynamic-DNS updater.
//
// ## Architecture Overview
//
// - **IpSource**: Trait for looking up the current public IPv4 address
// - **DnsProvider**: Trait for listing the managed DNS records and patching them
// - **PollState**: The last IP that was fully applied to every record
// - **DdnsEngine**: Timer-driven loop that detects changes and applies them
//
// ## Cycle
//
// Each timer tick spawns one cycle: lookup -> compare -> query -> update.
// The query and update only run when the looked-up IP differs from the
// poll state, and the poll state only advances when every record was
// patched successfully. A failed cycle is retried by the next tick.

pub mod config;
pub mod engine;
pub mod error;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{DdnsConfig, EngineConfig, IpSourceConfig, ProviderConfig};
pub use engine::{CycleError, CycleOutcome, CyclePhase, DdnsEngine, EngineEvent};
pub use error::{Error, Result};
pub use state::PollState;
pub use traits::{DnsProvider, DnsRecord, IpSource, UpdateResult};
