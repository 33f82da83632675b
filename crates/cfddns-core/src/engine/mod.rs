//! Core poll loop and change detector
//!
//! The DdnsEngine is responsible for:
//! - Firing a tick every poll interval
//! - Looking up the public IP on every tick
//! - Comparing it with the poll state
//! - Querying and updating the managed DNS records when it changed
//! - Advancing the poll state only after every record was updated
//!
//! ## Architecture
//!
//! ```text
//!  interval tick ──spawn──► cycle task (one per tick)
//!                               │
//!                               ▼
//!                        ┌─────────────┐
//!                        │  IpSource   │  (unsynchronized)
//!                        └─────────────┘
//!                               │
//!                  lock ┌───────▼───────┐
//!                       │  PollState    │──── equal ──► done
//!                       └───────┬───────┘
//!                               │ changed
//!                               ▼
//!                       ┌──────────────┐
//!                       │ DnsProvider  │  list_records, update_records
//!                       └──────────────┘
//!                               │ all ok
//!                               ▼
//!                      advance PollState, unlock
//! ```
//!
//! ## Failure Handling
//!
//! A failed cycle is logged and dropped. The poll state is untouched, so
//! the next tick sees the same "new" IP and runs the whole cycle again.
//! There is no retry inside a cycle.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::state::PollState;
use crate::traits::{DnsProvider, IpSource, UpdateResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Poll loop started
    Started {
        poll_interval_secs: u64,
    },

    /// A tick fired while a cycle was still running and was skipped
    TickSkipped {
        in_flight: usize,
    },

    /// Looked-up IP matches the poll state
    IpUnchanged {
        ip: Ipv4Addr,
    },

    /// Looked-up IP differs from the poll state
    IpChangeDetected {
        previous_ip: Option<Ipv4Addr>,
        new_ip: Ipv4Addr,
    },

    /// Managed records were listed
    RecordsFetched {
        count: usize,
    },

    /// One record now points at the new IP
    RecordUpdated {
        record_name: String,
        content: String,
        dry_run: bool,
    },

    /// Every record was updated and the poll state advanced
    CycleSucceeded {
        ip: Ipv4Addr,
        records: usize,
    },

    /// A cycle aborted; the poll state is unchanged
    CycleFailed {
        phase: CyclePhase,
        error: String,
    },

    /// Poll loop stopped
    Stopped {
        reason: String,
    },
}

/// The step of a cycle that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Public IP lookup
    Lookup,
    /// DNS record listing
    Query,
    /// DNS record patching
    Update,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePhase::Lookup => f.write_str("IP lookup"),
            CyclePhase::Query => f.write_str("DNS record query"),
            CyclePhase::Update => f.write_str("DNS record update"),
        }
    }
}

/// A failed cycle
#[derive(Debug, thiserror::Error)]
#[error("{phase} failed: {source}")]
pub struct CycleError {
    /// Where the cycle stopped
    pub phase: CyclePhase,
    /// What went wrong
    #[source]
    pub source: Error,
}

/// Result of a cycle that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The IP matched the poll state; nothing was queried or updated
    Unchanged { ip: Ipv4Addr },

    /// The IP changed and every matching record was updated
    Updated {
        ip: Ipv4Addr,
        previous_ip: Option<Ipv4Addr>,
        results: Vec<UpdateResult>,
        /// When the poll state advanced
        updated_at: DateTime<Utc>,
    },
}

/// Core poll loop
///
/// The engine owns the poll state and shares it between the tasks it
/// spawns. Cloning an engine is cheap and the clone shares the same state,
/// collaborators and event channel.
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`]
/// 2. Start with [`DdnsEngine::run()`] or [`DdnsEngine::run_with_shutdown()`]
/// 3. The loop runs until shutdown; cycles already in flight are not awaited
///
/// ## Overlapping Ticks
///
/// By default every tick spawns a cycle even when earlier cycles are still
/// running. Their lookups run concurrently; the compare/query/update part
/// is serialized by the poll state lock, so a queued cycle sees the state
/// left behind by the one before it. Setting
/// [`EngineConfig::skip_overlapping_ticks`] drops such ticks instead.
#[derive(Clone)]
pub struct DdnsEngine {
    /// IP source for public IP lookups
    ip_source: Arc<dyn IpSource>,

    /// DNS provider for listing and updating records
    provider: Arc<dyn DnsProvider>,

    /// Last fully applied IP
    state: Arc<Mutex<PollState>>,

    /// Time between ticks
    poll_interval: Duration,

    /// Skip ticks while a cycle is in flight
    skip_overlapping_ticks: bool,

    /// Number of spawned cycles that have not finished
    in_flight: Arc<AtomicUsize>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl DdnsEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        ip_source: Box<dyn IpSource>,
        provider: Box<dyn DnsProvider>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            ip_source: Arc::from(ip_source),
            provider: Arc::from(provider),
            state: Arc::new(Mutex::new(PollState::new())),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            skip_overlapping_ticks: config.skip_overlapping_ticks,
            in_flight: Arc::new(AtomicUsize::new(0)),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the poll loop until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the poll loop until `shutdown_rx` fires (or its sender is dropped)
    ///
    /// `None` behaves like [`DdnsEngine::run()`].
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            poll_interval_secs: self.poll_interval.as_secs(),
        });
        info!(
            "Polling {} every {:?}, updating via {}",
            self.ip_source.source_name(),
            self.poll_interval,
            self.provider.provider_name()
        );

        // First tick completes immediately
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        let shutdown = wait_for_shutdown(shutdown_rx);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    self.spawn_cycle();
                }

                reason = &mut shutdown => {
                    info!("{}, stopping poll loop", reason);
                    self.emit_event(EngineEvent::Stopped {
                        reason: reason.to_string(),
                    });
                    break;
                }
            }
        }

        let in_flight = self.in_flight();
        if in_flight > 0 {
            warn!("Abandoning {} in-flight cycle(s)", in_flight);
        }

        Ok(())
    }

    /// Spawn one cycle for the current tick
    fn spawn_cycle(&self) {
        let in_flight = self.in_flight();
        if self.skip_overlapping_ticks && in_flight > 0 {
            debug!("Previous cycle still running, skipping tick");
            self.emit_event(EngineEvent::TickSkipped { in_flight });
            return;
        }

        let guard = InFlightGuard::enter(&self.in_flight);
        let engine = self.clone();
        tokio::spawn(async move {
            // Released on completion and on panic
            let _guard = guard;
            // Errors end here; they never reach the loop or other cycles
            if let Err(e) = engine.run_cycle().await {
                error!("{}", e);
            }
        });
    }

    /// Run a single lookup -> compare -> query -> update cycle
    ///
    /// The poll state lock is held from the comparison until the cycle
    /// ends, so concurrent cycles never interleave their updates.
    ///
    /// # Returns
    ///
    /// - `Ok(CycleOutcome::Unchanged)`: IP matched the poll state
    /// - `Ok(CycleOutcome::Updated)`: Every record updated, poll state advanced
    /// - `Err(CycleError)`: The cycle stopped; the poll state is unchanged
    pub async fn run_cycle(&self) -> std::result::Result<CycleOutcome, CycleError> {
        debug!("Starting IP update cycle");

        let current_ip = self
            .ip_source
            .current()
            .await
            .map_err(|e| self.cycle_failed(CyclePhase::Lookup, e))?;

        let mut state = self.state.lock().await;

        if state.is_current(current_ip) {
            debug!("IP unchanged ({}), nothing to update", current_ip);
            self.emit_event(EngineEvent::IpUnchanged { ip: current_ip });
            return Ok(CycleOutcome::Unchanged { ip: current_ip });
        }

        let previous_ip = state.last_ip();
        info!(
            "IP has changed ({} -> {}, last applied {}), updating {} DNS records",
            previous_ip.map_or_else(|| "none".to_string(), |ip| ip.to_string()),
            current_ip,
            state
                .last_updated()
                .map_or_else(|| "never".to_string(), |at| at.to_rfc3339()),
            self.provider.provider_name()
        );
        self.emit_event(EngineEvent::IpChangeDetected {
            previous_ip,
            new_ip: current_ip,
        });

        let records = self
            .provider
            .list_records()
            .await
            .map_err(|e| self.cycle_failed(CyclePhase::Query, e))?;

        if records.is_empty() {
            warn!("No DNS records matched the filter");
        } else {
            debug!("Found {} matching DNS record(s)", records.len());
        }
        self.emit_event(EngineEvent::RecordsFetched {
            count: records.len(),
        });

        let results = self
            .provider
            .update_records(&records, current_ip)
            .await
            .map_err(|e| self.cycle_failed(CyclePhase::Update, e))?;

        for result in &results {
            self.emit_event(EngineEvent::RecordUpdated {
                record_name: result.record_name().to_string(),
                content: result.new_content().to_string(),
                dry_run: result.is_dry_run(),
            });
        }

        let updated_at = state.advance(current_ip);
        info!(
            "{} DNS record(s) now point at {} (as of {})",
            results.len(),
            current_ip,
            updated_at.to_rfc3339()
        );
        self.emit_event(EngineEvent::CycleSucceeded {
            ip: current_ip,
            records: results.len(),
        });

        Ok(CycleOutcome::Updated {
            ip: current_ip,
            previous_ip,
            results,
            updated_at,
        })
    }

    /// The last IP applied to every record, if any
    ///
    /// Waits for any cycle currently holding the poll state.
    pub async fn last_ip(&self) -> Option<Ipv4Addr> {
        self.state.lock().await.last_ip()
    }

    /// When the poll state last advanced, if ever
    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_updated()
    }

    /// Number of spawned cycles that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn cycle_failed(&self, phase: CyclePhase, source: Error) -> CycleError {
        self.emit_event(EngineEvent::CycleFailed {
            phase,
            error: source.to_string(),
        });
        CycleError { phase, source }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Counts one spawned cycle for as long as it is alive
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolve once the loop should stop, with the reason
async fn wait_for_shutdown(shutdown_rx: Option<oneshot::Receiver<()>>) -> &'static str {
    match shutdown_rx {
        Some(rx) => match rx.await {
            Ok(()) => "Shutdown signal received",
            Err(_) => "Shutdown channel closed",
        },
        None => match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C received",
            Err(e) => {
                warn!("Unable to listen for Ctrl-C ({}), running until terminated", e);
                std::future::pending().await
            }
        },
    }
}
