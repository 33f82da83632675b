//! Contract Test: Poll Loop Scheduling
//!
//! Verifies how ticks turn into cycles. Time is paused, so the interval
//! and the mock latencies advance deterministically.
//!
//! Constraints verified:
//! - The first tick fires immediately, then one per poll interval
//! - Overlapping ticks are not coalesced by default; they queue on the poll
//!   state lock and see the state the previous cycle left behind
//! - With skip_overlapping_ticks, ticks during a running cycle are dropped
//! - Cycle failures never stop the loop
//! - A panicking cycle still releases its in-flight slot
//! - Shutdown stops the loop without waiting for in-flight cycles

mod common;

use cfddns_core::{DdnsEngine, EngineEvent};
use common::*;
use std::net::Ipv4Addr;
use std::time::Duration;

fn spawn_loop(
    engine: &DdnsEngine,
) -> (
    tokio::sync::oneshot::Sender<()>,
    tokio::task::JoinHandle<cfddns_core::Result<()>>,
) {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine = engine.clone();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });
    (shutdown_tx, handle)
}

#[tokio::test(start_paused = true)]
async fn ticks_fire_immediately_then_every_interval() {
    let ip_source = ScriptedIpSource::new(Ipv4Addr::new(1, 2, 3, 4));
    let provider = MockDnsProvider::new(two_records());
    let (engine, _event_rx) = engine_with(&ip_source, &provider, test_config());

    let (shutdown_tx, handle) = spawn_loop(&engine);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ip_source.lookup_count(), 1, "first tick is immediate");

    // Ticks at 120s and 240s
    tokio::time::sleep(Duration::from_secs(250)).await;
    assert_eq!(ip_source.lookup_count(), 3);
    assert_eq!(provider.list_count(), 1, "unchanged IP is never re-queried");

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn overlapping_ticks_queue_on_the_poll_state() {
    let ip = Ipv4Addr::new(1, 2, 3, 4);
    let ip_source = ScriptedIpSource::new(ip);
    let provider = MockDnsProvider::new(vec![two_records().remove(0)]);
    // The first cycle holds the poll state for 300s
    provider.slow_updates(Duration::from_secs(300));
    let (engine, _event_rx) = engine_with(&ip_source, &provider, test_config());

    let (shutdown_tx, handle) = spawn_loop(&engine);

    // Ticks at 0, 120 and 240 have all looked up the IP
    tokio::time::sleep(Duration::from_secs(250)).await;
    assert_eq!(ip_source.lookup_count(), 3, "lookups are not serialized");
    assert_eq!(provider.list_count(), 1);
    assert_eq!(engine.in_flight(), 3);

    // The first cycle finishes at 300s; the queued ones see the new state
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provider.list_count(), 1, "queued cycles must not re-query");
    assert_eq!(provider.update_calls().len(), 1);
    assert_eq!(engine.last_ip().await, Some(ip));
    assert_eq!(engine.in_flight(), 0);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn skip_policy_drops_ticks_while_busy() {
    let ip_source = ScriptedIpSource::new(Ipv4Addr::new(1, 2, 3, 4));
    let provider = MockDnsProvider::new(vec![two_records().remove(0)]);
    provider.slow_updates(Duration::from_secs(300));
    let config = test_config().with_skip_overlapping_ticks(true);
    let (engine, mut event_rx) = engine_with(&ip_source, &provider, config);

    let (shutdown_tx, handle) = spawn_loop(&engine);

    tokio::time::sleep(Duration::from_secs(250)).await;
    assert_eq!(ip_source.lookup_count(), 1, "ticks at 120s and 240s are skipped");
    assert_eq!(engine.in_flight(), 1);

    // First cycle done at 300s; the tick at 360s runs again
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(ip_source.lookup_count(), 2);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    let skipped = drain_events(&mut event_rx)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::TickSkipped { .. }))
        .count();
    assert_eq!(skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn failing_cycles_do_not_stop_the_loop() {
    let ip = Ipv4Addr::new(1, 2, 3, 4);
    let ip_source = ScriptedIpSource::new(ip);
    ip_source.fail("dns resolution failed");
    let provider = MockDnsProvider::new(two_records());
    let (engine, _event_rx) = engine_with(&ip_source, &provider, test_config());

    let (shutdown_tx, handle) = spawn_loop(&engine);

    tokio::time::sleep(Duration::from_secs(130)).await;
    assert_eq!(ip_source.lookup_count(), 2);
    assert_eq!(provider.list_count(), 0);

    // Lookup recovers; the next tick applies the IP
    ip_source.set_ip(ip);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(provider.list_count(), 1);
    assert_eq!(engine.last_ip().await, Some(ip));

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn panicking_cycle_does_not_block_skip_policy() {
    let ip = Ipv4Addr::new(1, 2, 3, 4);
    let ip_source = ScriptedIpSource::new(ip);
    ip_source.panic_once();
    let provider = MockDnsProvider::new(two_records());
    let config = test_config().with_skip_overlapping_ticks(true);
    let (engine, mut event_rx) = engine_with(&ip_source, &provider, config);

    let (shutdown_tx, handle) = spawn_loop(&engine);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ip_source.lookup_count(), 1);
    assert_eq!(engine.in_flight(), 0, "panicked cycle must release its slot");

    // The tick at 120s runs instead of being skipped
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(ip_source.lookup_count(), 2);
    assert_eq!(provider.list_count(), 1);
    assert_eq!(engine.last_ip().await, Some(ip));

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    let skipped = drain_events(&mut event_rx)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::TickSkipped { .. }))
        .count();
    assert_eq!(skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_does_not_wait_for_in_flight_cycles() {
    let ip_source = ScriptedIpSource::new(Ipv4Addr::new(1, 2, 3, 4));
    let provider = MockDnsProvider::new(two_records());
    provider.slow_updates(Duration::from_secs(3600));
    let (engine, mut event_rx) = engine_with(&ip_source, &provider, test_config());

    let (shutdown_tx, handle) = spawn_loop(&engine);
    tokio::time::sleep(Duration::from_secs(1)).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(engine.in_flight(), 1);
    let events = drain_events(&mut event_rx);
    assert!(matches!(
        events.first(),
        Some(EngineEvent::Started {
            poll_interval_secs: 120
        })
    ));
    assert!(matches!(events.last(), Some(EngineEvent::Stopped { .. })));
}

#[tokio::test(start_paused = true)]
async fn dropped_shutdown_sender_stops_the_loop() {
    let ip_source = ScriptedIpSource::new(Ipv4Addr::new(1, 2, 3, 4));
    let provider = MockDnsProvider::new(two_records());
    let (engine, _event_rx) = engine_with(&ip_source, &provider, test_config());

    let (shutdown_tx, handle) = spawn_loop(&engine);
    drop(shutdown_tx);

    handle.await.unwrap().unwrap();
}
