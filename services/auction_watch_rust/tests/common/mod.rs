//! In-memory collaborators for driving full cycles

#![allow(dead_code)]

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use auction_watch_core::db::NotificationStore;
use auction_watch_core::models::{
    ConnectedRealm, Fingerprint, ItemId, Lot, Notification, NotificationKind, PriceAlert, RealmId,
    Snapshot, Subscriber, SubscriberId,
};
use auction_watch_core::notify::NotificationSink;
use auction_watch_core::providers::{MarketDataProvider, ProviderError};
use auction_watch_core::retry::RetryPolicy;
use auction_watch_rust::{CycleStats, PartitionWorker, Scheduler, SchedulerConfig};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
pub struct FakeStore {
    pub notifications: Vec<Notification>,
    pub items: HashMap<ItemId, String>,
    pub realms: HashMap<RealmId, ConnectedRealm>,
    pub subscribers: HashMap<SubscriberId, Subscriber>,
    pub fail_listing: bool,
    dropped_connections: AtomicU32,
    pub list_calls: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn realm(mut self, id: RealmId, name: &str) -> Self {
        self.realms.insert(
            id,
            ConnectedRealm {
                id,
                region: "eu".to_string(),
                slug: name.to_lowercase(),
                name: name.to_string(),
            },
        );
        self
    }

    pub fn item(mut self, id: ItemId, name: &str) -> Self {
        self.items.insert(id, name.to_string());
        self
    }

    pub fn subscriber(mut self, id: SubscriberId, telegram_id: i64, level: i32) -> Self {
        self.subscribers.insert(
            id,
            Subscriber {
                id,
                telegram_id,
                level,
            },
        );
        self
    }

    pub fn notification(
        mut self,
        id: i64,
        subscriber_id: SubscriberId,
        realm_id: RealmId,
        item_id: ItemId,
        kind: NotificationKind,
        price: u64,
        value: u64,
    ) -> Self {
        self.notifications.push(Notification {
            id,
            subscriber_id,
            realm_id,
            item_id,
            kind,
            price,
            value,
        });
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// The first `times` notification listings lose their connection
    pub fn dropped_connections(self, times: u32) -> Self {
        self.dropped_connections.store(times, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl NotificationStore for FakeStore {
    async fn list_active_notifications(&self) -> Result<Vec<Notification>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let dropped = self
            .dropped_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))
            .context("Failed to load notifications");
        }
        if self.fail_listing {
            return Err(anyhow!("relation \"notifications\" does not exist"));
        }
        Ok(self.notifications.clone())
    }

    async fn lookup_item_names(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, String>> {
        Ok(item_ids
            .iter()
            .filter_map(|id| self.items.get(id).map(|name| (*id, name.clone())))
            .collect())
    }

    async fn lookup_partition(&self, realm_id: RealmId) -> Result<Option<ConnectedRealm>> {
        Ok(self.realms.get(&realm_id).cloned())
    }

    async fn lookup_subscriber(&self, subscriber_id: SubscriberId) -> Result<Option<Subscriber>> {
        Ok(self.subscribers.get(&subscriber_id).cloned())
    }

    async fn list_partitions(&self) -> Result<Vec<ConnectedRealm>> {
        if self.fail_listing {
            return Err(anyhow!("connection refused"));
        }
        let mut realms: Vec<ConnectedRealm> = self.realms.values().cloned().collect();
        realms.sort_by_key(|r| r.id);
        Ok(realms)
    }

    async fn lookup_subscriber_by_telegram(&self, telegram_id: i64) -> Result<Option<Subscriber>> {
        Ok(self
            .subscribers
            .values()
            .find(|s| s.telegram_id == telegram_id)
            .cloned())
    }
}

// ============================================================================
// Provider
// ============================================================================

#[derive(Default)]
pub struct FakeProvider {
    lots: HashMap<RealmId, Vec<(ItemId, Lot)>>,
    failing: HashSet<RealmId>,
    panicking: HashSet<RealmId>,
    expired_token: Mutex<HashMap<RealmId, u32>>,
    fingerprints: Mutex<VecDeque<Result<Option<Fingerprint>, ProviderError>>>,
    last_fingerprint: Mutex<Option<Fingerprint>>,
    fingerprint_hangs: bool,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    pub snapshot_calls: Mutex<Vec<(RealmId, Vec<ItemId>)>>,
    pub fingerprint_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lot(mut self, realm_id: RealmId, item_id: ItemId, price: u64, quantity: u64) -> Self {
        self.lots
            .entry(realm_id)
            .or_default()
            .push((item_id, Lot::new(price, quantity)));
        self
    }

    /// Snapshot requests for `realm_id` fail permanently
    pub fn failing(mut self, realm_id: RealmId) -> Self {
        self.failing.insert(realm_id);
        self
    }

    pub fn panicking(mut self, realm_id: RealmId) -> Self {
        self.panicking.insert(realm_id);
        self
    }

    /// The first `times` snapshot requests for `realm_id` see an expired token
    pub fn expired_token(self, realm_id: RealmId, times: u32) -> Self {
        self.expired_token
            .lock()
            .unwrap()
            .insert(realm_id, times);
        self
    }

    /// Scripted fingerprint responses; the last value repeats afterwards
    pub fn fingerprints(self, script: Vec<Result<Option<&str>, ProviderError>>) -> Self {
        *self.fingerprints.lock().unwrap() = script
            .into_iter()
            .map(|r| r.map(|f| f.map(|s| Fingerprint(s.to_string()))))
            .collect();
        self
    }

    pub fn fingerprint_hangs(mut self) -> Self {
        self.fingerprint_hangs = true;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Snapshot requests wait for a permit of `gate`
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn snapshot_call_count(&self) -> usize {
        self.snapshot_calls.lock().unwrap().len()
    }

    pub fn requested_items(&self, realm_id: RealmId) -> Vec<Vec<ItemId>> {
        self.snapshot_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == realm_id)
            .map(|(_, items)| items.clone())
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    async fn fetch_snapshot(
        &self,
        realm: &ConnectedRealm,
        item_ids: &[ItemId],
    ) -> Result<Snapshot, ProviderError> {
        self.snapshot_calls
            .lock()
            .unwrap()
            .push((realm.id, item_ids.to_vec()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(&realm.id) {
            panic!("provider exploded for realm {}", realm.id);
        }
        if self.failing.contains(&realm.id) {
            return Err(ProviderError::Http {
                status: 404,
                body: "realm not found".to_string(),
            });
        }
        {
            let mut expired = self.expired_token.lock().unwrap();
            if let Some(remaining) = expired.get_mut(&realm.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ProviderError::Unauthorized);
                }
            }
        }

        let lots = self.lots.get(&realm.id).cloned().unwrap_or_default();
        Ok(Snapshot::from_lots(
            lots.into_iter().filter(|(item, _)| item_ids.contains(item)),
        ))
    }

    async fn fetch_fingerprint(
        &self,
        _realm: &ConnectedRealm,
    ) -> Result<Option<Fingerprint>, ProviderError> {
        self.fingerprint_calls.fetch_add(1, Ordering::SeqCst);
        if self.fingerprint_hangs {
            std::future::pending::<()>().await;
        }

        let next = self.fingerprints.lock().unwrap().pop_front();
        match next {
            Some(Ok(fingerprint)) => {
                if fingerprint.is_some() {
                    *self.last_fingerprint.lock().unwrap() = fingerprint.clone();
                }
                Ok(fingerprint)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last_fingerprint.lock().unwrap().clone()),
        }
    }

    fn provider_name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Sink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(i64, PriceAlert)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Notification ids delivered so far, sorted
    pub fn notification_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, alert)| alert.notification_id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, subscriber: &Subscriber, alert: &PriceAlert) {
        self.sent
            .lock()
            .unwrap()
            .push((subscriber.telegram_id, alert.clone()));
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub store: Arc<FakeStore>,
    pub provider: Arc<FakeProvider>,
    pub sink: Arc<RecordingSink>,
    pub scheduler: Arc<Scheduler>,
}

pub fn harness(store: FakeStore, provider: FakeProvider, workers: usize) -> Harness {
    let store = Arc::new(store);
    let provider = Arc::new(provider);
    let sink = Arc::new(RecordingSink::new());

    let worker = Arc::new(PartitionWorker::new(
        store.clone(),
        provider.clone(),
        sink.clone(),
    ));
    let config = SchedulerConfig {
        update_interval: Duration::from_secs(3600),
        worker_pool_size: workers,
        store_retry: RetryPolicy::immediate(3),
        stats_log_every_cycles: 1,
    };
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        worker,
        config,
        Arc::new(CycleStats::new()),
    ));

    Harness {
        store,
        provider,
        sink,
        scheduler,
    }
}
