// # Poll State
//
// The one piece of mutable state the updater keeps: the last public IP
// that was applied to every managed record.
//
// Nothing is persisted. After a restart the state is empty, so the first
// successful lookup always triggers a full query + update cycle.

use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;

/// Last fully applied public IP
///
/// The engine owns this behind an async mutex and holds the lock for the
/// whole compare -> query -> update -> advance sequence of a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollState {
    last_ip: Option<Ipv4Addr>,
    last_updated: Option<DateTime<Utc>>,
}

impl PollState {
    /// Create an empty state (no IP observed yet)
    pub fn new() -> Self {
        Self::default()
    }

    /// The last IP applied to every record, if any
    pub fn last_ip(&self) -> Option<Ipv4Addr> {
        self.last_ip
    }

    /// When the state last advanced
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Whether `ip` is what every record already points at
    pub fn is_current(&self, ip: Ipv4Addr) -> bool {
        self.last_ip == Some(ip)
    }

    /// Record a fully successful cycle
    ///
    /// Only call this after every record update reported success.
    /// Returns the time the state advanced.
    pub fn advance(&mut self, ip: Ipv4Addr) -> DateTime<Utc> {
        let now = Utc::now();
        self.last_ip = Some(ip);
        self.last_updated = Some(now);
        now
    }
}
