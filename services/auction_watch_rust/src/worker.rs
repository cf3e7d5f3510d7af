//! Per-partition unit of work
//!
//! One call to [`PartitionWorker::process`] fetches a single snapshot for a
//! connected realm, limited to the items its notifications reference, and
//! evaluates every notification against it. Notifications that point at
//! records deleted in the meantime are skipped one by one.

use anyhow::{Context, Result};
use auction_watch_core::db::NotificationStore;
use auction_watch_core::matching::evaluate_notification;
use auction_watch_core::models::{
    ItemId, Notification, PriceAlert, RealmId, Subscriber, SubscriberId,
};
use auction_watch_core::notify::NotificationSink;
use auction_watch_core::providers::MarketDataProvider;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// What one partition unit did during a cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    pub realm_id: RealmId,
    pub evaluated: usize,
    pub fired: usize,
    pub skipped: usize,
}

pub struct PartitionWorker {
    store: Arc<dyn NotificationStore>,
    provider: Arc<dyn MarketDataProvider>,
    sink: Arc<dyn NotificationSink>,
}

impl PartitionWorker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        provider: Arc<dyn MarketDataProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            provider,
            sink,
        }
    }

    /// Evaluate `notifications`, all targeting `realm_id`, against a fresh
    /// snapshot. Fails only when the snapshot or a store lookup fails.
    pub async fn process(
        &self,
        realm_id: RealmId,
        notifications: Vec<Notification>,
    ) -> Result<PartitionReport> {
        let mut report = PartitionReport {
            realm_id,
            ..Default::default()
        };
        if notifications.is_empty() {
            return Ok(report);
        }

        let realm = match self
            .store
            .lookup_partition(realm_id)
            .await
            .with_context(|| format!("Failed to look up connected realm {}", realm_id))?
        {
            Some(realm) => realm,
            None => {
                warn!(
                    "Connected realm {} no longer exists, skipping {} notifications",
                    realm_id,
                    notifications.len()
                );
                report.skipped = notifications.len();
                return Ok(report);
            }
        };

        let item_ids: Vec<ItemId> = notifications
            .iter()
            .map(|n| n.item_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let item_names = self
            .store
            .lookup_item_names(&item_ids)
            .await
            .with_context(|| format!("Failed to look up item names for realm {}", realm_id))?;

        let snapshot = self
            .provider
            .fetch_snapshot(&realm, &item_ids)
            .await
            .with_context(|| {
                format!(
                    "Failed to fetch auctions for {} via {}",
                    realm.display_name(),
                    self.provider.provider_name()
                )
            })?;

        debug!(
            "{}: {} notifications over {} items, {} listed",
            realm.display_name(),
            notifications.len(),
            item_ids.len(),
            snapshot.item_count()
        );

        let realm_name = realm.display_name();
        let mut subscribers: HashMap<SubscriberId, Option<Subscriber>> = HashMap::new();

        for notification in notifications {
            let Some(item_name) = item_names.get(&notification.item_id) else {
                warn!(
                    "Notification {} references unknown item {}, skipping",
                    notification.id, notification.item_id
                );
                report.skipped += 1;
                continue;
            };

            let subscriber = match subscribers.get(&notification.subscriber_id) {
                Some(cached) => cached.clone(),
                None => {
                    let found = self
                        .store
                        .lookup_subscriber(notification.subscriber_id)
                        .await
                        .with_context(|| {
                            format!("Failed to look up subscriber {}", notification.subscriber_id)
                        })?;
                    subscribers.insert(notification.subscriber_id, found.clone());
                    found
                }
            };
            let Some(subscriber) = subscriber else {
                warn!(
                    "Notification {} references unknown subscriber {}, skipping",
                    notification.id, notification.subscriber_id
                );
                report.skipped += 1;
                continue;
            };

            let result = evaluate_notification(&notification, &snapshot);
            report.evaluated += 1;
            if !result.fired {
                continue;
            }

            let alert = PriceAlert {
                notification_id: notification.id,
                realm_name: realm_name.clone(),
                item_id: notification.item_id,
                item_name: item_name.clone(),
                kind: notification.kind,
                threshold: notification.price,
                value: notification.value,
                result,
            };
            self.sink.send(&subscriber, &alert).await;
            report.fired += 1;
        }

        info!(
            "{}: evaluated {}, fired {}, skipped {}",
            realm_name, report.evaluated, report.fired, report.skipped
        );
        Ok(report)
    }
}
