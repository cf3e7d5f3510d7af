//! Startup interval discovery: bounded probing and readiness signalling

mod common;

use auction_watch_core::providers::ProviderError;
use auction_watch_rust::{DiscoveryConfig, DiscoveryOutcome, IntervalDiscoverer};
use common::{harness, FakeProvider, FakeStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const PROBE: Duration = Duration::from_secs(60);

fn discoverer(store: FakeStore, provider: Arc<FakeProvider>, max_attempts: u32) -> IntervalDiscoverer {
    IntervalDiscoverer::new(
        Arc::new(store),
        provider,
        DiscoveryConfig {
            probe_interval: PROBE,
            max_attempts,
        },
    )
}

fn realms() -> FakeStore {
    FakeStore::new().realm(1305, "Kazzak").realm(1403, "Draenor")
}

#[tokio::test(start_paused = true)]
async fn test_skips_without_partitions() {
    let provider = Arc::new(FakeProvider::new());
    let outcome = discoverer(FakeStore::new(), provider.clone(), 10).discover().await;

    assert_eq!(outcome, DiscoveryOutcome::Skipped);
    assert_eq!(provider.fingerprint_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_counts_as_no_partitions() {
    let provider = Arc::new(FakeProvider::new());
    let outcome = discoverer(realms().failing(), provider.clone(), 10).discover().await;

    assert_eq!(outcome, DiscoveryOutcome::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_stops_when_fingerprint_changes() {
    let provider = Arc::new(FakeProvider::new().fingerprints(vec![
        Ok(Some("Mon, 01 Jan 2024 10:00:00 GMT")),
        Ok(Some("Mon, 01 Jan 2024 10:00:00 GMT")),
        Ok(Some("Mon, 01 Jan 2024 11:00:00 GMT")),
    ]));

    let outcome = discoverer(realms(), provider.clone(), 10).discover().await;

    match outcome {
        DiscoveryOutcome::Refreshed { attempts, elapsed } => {
            assert_eq!(attempts, 3);
            assert_eq!(elapsed, PROBE * 2);
        }
        other => panic!("expected refresh, got {:?}", other),
    }
    assert_eq!(provider.fingerprint_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_errors_and_missing_fingerprints_count_as_unchanged() {
    let provider = Arc::new(FakeProvider::new().fingerprints(vec![
        Err(ProviderError::Unauthorized),
        Ok(None),
        Ok(Some("v1")),
        Err(ProviderError::Network("reset".to_string())),
        Ok(Some("v1")),
        Ok(Some("v2")),
    ]));

    let outcome = discoverer(realms(), provider, 10).discover().await;

    assert!(matches!(outcome, DiscoveryOutcome::Refreshed { attempts: 6, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_exhausts_within_bound_when_nothing_changes() {
    let provider = Arc::new(FakeProvider::new().fingerprints(vec![Ok(Some("v1"))]));
    let started = Instant::now();

    let outcome = discoverer(realms(), provider.clone(), 5).discover().await;

    assert_eq!(outcome, DiscoveryOutcome::Exhausted { attempts: 5 });
    assert_eq!(provider.fingerprint_calls.load(Ordering::SeqCst), 5);
    assert!(started.elapsed() <= PROBE * 5);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_provider_still_terminates() {
    let provider = Arc::new(FakeProvider::new().fingerprint_hangs());
    let started = Instant::now();

    let outcome = discoverer(realms(), provider.clone(), 3).discover().await;

    assert_eq!(outcome, DiscoveryOutcome::Exhausted { attempts: 3 });
    assert!(started.elapsed() <= PROBE * 3);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_signals_readiness() {
    let provider = Arc::new(FakeProvider::new().fingerprints(vec![Ok(Some("v1")), Ok(Some("v2"))]));

    let ready = discoverer(realms(), provider, 10).spawn();

    let outcome = ready.await.unwrap();
    assert!(matches!(outcome, DiscoveryOutcome::Refreshed { attempts: 2, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_starts_after_readiness() {
    use auction_watch_core::models::NotificationKind::MarketPrice;

    let store = FakeStore::new()
        .realm(1305, "Kazzak")
        .item(2589, "Linen Cloth")
        .subscriber(1, 1001, 0)
        .notification(10, 1, 1305, 2589, MarketPrice, 150, 0);
    let h = harness(store, FakeProvider::new().lot(1305, 2589, 100, 1), 4);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let runner = tokio::spawn(h.scheduler.clone().run(rx));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.provider.snapshot_call_count(), 0);

    tx.send(DiscoveryOutcome::Skipped).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.provider.snapshot_call_count(), 1);

    // Next cycle one update interval later
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(h.provider.snapshot_call_count(), 2);

    runner.abort();
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_starts_when_discovery_is_lost() {
    let h = harness(realms(), FakeProvider::new(), 4);

    let (tx, rx) = tokio::sync::oneshot::channel::<DiscoveryOutcome>();
    drop(tx);
    let runner = tokio::spawn(h.scheduler.clone().run(rx));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.scheduler.stats().snapshot().cycles, 1);

    runner.abort();
}
