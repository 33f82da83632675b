//! Test doubles and common utilities for the engine contract tests
//!
//! The doubles are `Clone` and share their state between clones, so a test
//! can hand one clone to the engine and keep another to script behavior and
//! inspect calls.

#![allow(dead_code)]

use cfddns_core::error::{Error, Result};
use cfddns_core::traits::{DnsProvider, DnsRecord, IpSource, UpdateResult};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An IpSource whose answer the test controls
#[derive(Clone)]
pub struct ScriptedIpSource {
    /// What the next lookup returns (Err holds a network error message)
    answer: Arc<Mutex<std::result::Result<Ipv4Addr, String>>>,
    /// Call counter for current()
    lookup_count: Arc<AtomicUsize>,
    /// When set, the next current() call panics
    panic_next: Arc<AtomicBool>,
}

impl ScriptedIpSource {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            answer: Arc::new(Mutex::new(Ok(ip))),
            lookup_count: Arc::new(AtomicUsize::new(0)),
            panic_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make the next lookup panic instead of returning
    pub fn panic_once(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    /// Make subsequent lookups return `ip`
    pub fn set_ip(&self, ip: Ipv4Addr) {
        *self.answer.lock().unwrap() = Ok(ip);
    }

    /// Make subsequent lookups fail with a network error
    pub fn fail(&self, message: &str) {
        *self.answer.lock().unwrap() = Err(message.to_string());
    }

    /// Get the number of times current() was called
    pub fn lookup_count(&self) -> usize {
        self.lookup_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for ScriptedIpSource {
    async fn current(&self) -> Result<Ipv4Addr> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted lookup panic");
        }
        self.answer
            .lock()
            .unwrap()
            .clone()
            .map_err(Error::network)
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A DnsProvider backed by an in-memory "remote" record set
#[derive(Clone)]
pub struct MockDnsProvider {
    /// Records returned by list_records(), in order
    records: Arc<Mutex<Vec<DnsRecord>>>,
    /// Content the "remote" currently holds, by record id
    remote_content: Arc<Mutex<HashMap<String, String>>>,
    /// Call counter for list_records()
    list_count: Arc<AtomicUsize>,
    /// Record ids passed to update_record(), in call order
    update_calls: Arc<Mutex<Vec<(String, String)>>>,
    /// When set, list_records() fails with this provider message
    list_failure: Arc<Mutex<Option<String>>>,
    /// Record ids whose update reports success=false
    rejected_ids: Arc<Mutex<HashSet<String>>>,
    /// Artificial latency for each update
    update_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockDnsProvider {
    pub fn new(records: Vec<DnsRecord>) -> Self {
        let remote_content = records
            .iter()
            .map(|r| (r.id.clone(), r.content.clone()))
            .collect();

        Self {
            records: Arc::new(Mutex::new(records)),
            remote_content: Arc::new(Mutex::new(remote_content)),
            list_count: Arc::new(AtomicUsize::new(0)),
            update_calls: Arc::new(Mutex::new(Vec::new())),
            list_failure: Arc::new(Mutex::new(None)),
            rejected_ids: Arc::new(Mutex::new(HashSet::new())),
            update_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Make list_records() fail (None restores normal behavior)
    pub fn fail_listing(&self, message: Option<&str>) {
        *self.list_failure.lock().unwrap() = message.map(str::to_string);
    }

    /// Make updates of record `id` report success=false
    pub fn reject_updates_for(&self, id: &str) {
        self.rejected_ids.lock().unwrap().insert(id.to_string());
    }

    /// Stop rejecting updates
    pub fn accept_all_updates(&self) {
        self.rejected_ids.lock().unwrap().clear();
    }

    /// Delay every update by `delay`
    pub fn slow_updates(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = Some(delay);
    }

    /// Get the number of times list_records() was called
    pub fn list_count(&self) -> usize {
        self.list_count.load(Ordering::SeqCst)
    }

    /// (record id, content) pairs passed to update_record(), in order
    pub fn update_calls(&self) -> Vec<(String, String)> {
        self.update_calls.lock().unwrap().clone()
    }

    /// Content the "remote" holds for record `id`
    pub fn remote_content(&self, id: &str) -> Option<String> {
        self.remote_content.lock().unwrap().get(id).cloned()
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_records(&self) -> Result<Vec<DnsRecord>> {
        self.list_count.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.list_failure.lock().unwrap().clone() {
            return Err(Error::provider("mock", message));
        }

        // Report what the remote holds now, like a real listing would
        let remote = self.remote_content.lock().unwrap().clone();
        let records = self
            .records
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(|mut record| {
                if let Some(content) = remote.get(&record.id) {
                    record.content = content.clone();
                }
                record
            })
            .collect();
        Ok(records)
    }

    async fn update_record(&self, record: &DnsRecord, new_ip: Ipv4Addr) -> Result<UpdateResult> {
        let delay = *self.update_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.update_calls
            .lock()
            .unwrap()
            .push((record.id.clone(), new_ip.to_string()));

        if self.rejected_ids.lock().unwrap().contains(&record.id) {
            return Err(Error::provider(
                "mock",
                format!("update of {} rejected: [1004: DNS Validation Error]", record.name),
            ));
        }

        self.remote_content
            .lock()
            .unwrap()
            .insert(record.id.clone(), new_ip.to_string());

        Ok(UpdateResult::Updated {
            record_name: record.name.clone(),
            previous_content: record.content.clone(),
            new_content: new_ip.to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Two A records the mock provider manages
pub fn two_records() -> Vec<DnsRecord> {
    vec![
        DnsRecord::new("rec-1", "home.example.com", "192.0.2.1").with_comment("ddns"),
        DnsRecord::new("rec-2", "vpn.example.com", "192.0.2.1").with_comment("ddns"),
    ]
}

/// Engine config used by the contract tests
pub fn test_config() -> cfddns_core::EngineConfig {
    cfddns_core::EngineConfig {
        poll_interval_secs: 120,
        skip_overlapping_ticks: false,
        event_channel_capacity: 100,
    }
}

/// Build an engine around the given doubles
pub fn engine_with(
    ip_source: &ScriptedIpSource,
    provider: &MockDnsProvider,
    config: cfddns_core::EngineConfig,
) -> (
    cfddns_core::DdnsEngine,
    tokio::sync::mpsc::Receiver<cfddns_core::EngineEvent>,
) {
    cfddns_core::DdnsEngine::new(
        Box::new(ip_source.clone()),
        Box::new(provider.clone()),
        config,
    )
    .expect("engine construction succeeds")
}

/// Drain every event currently buffered on the channel
pub fn drain_events(
    rx: &mut tokio::sync::mpsc::Receiver<cfddns_core::EngineEvent>,
) -> Vec<cfddns_core::EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
