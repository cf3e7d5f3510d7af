//! Cycle scheduler
//!
//! Drives matching cycles on a fixed period and on demand. A cycle loads
//! every notification, groups them by connected realm and spawns one
//! [`PartitionWorker`] task per realm. Tasks share a semaphore sized to the
//! worker pool and take their permit inside the task, so dispatch returns as
//! soon as everything is spawned and the timer never waits on a slow realm.
//!
//! Cycles may overlap. Evaluation has no shared mutable state, so the only
//! effect of overlap is a possible duplicate message.

use crate::discovery::DiscoveryOutcome;
use crate::stats::CycleStats;
use crate::worker::{PartitionReport, PartitionWorker};
use anyhow::{Context, Result};
use auction_watch_core::db::NotificationStore;
use auction_watch_core::models::{Notification, RealmId};
use auction_watch_core::retry::{execute_with_retry, is_retriable_db_error, RetryPolicy};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub update_interval: Duration,
    pub worker_pool_size: usize,
    /// Retry budget for loading notifications at the start of a cycle
    pub store_retry: RetryPolicy,
    pub stats_log_every_cycles: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(60 * 60),
            worker_pool_size: 4,
            store_retry: RetryPolicy::default(),
            stats_log_every_cycles: 1,
        }
    }
}

impl From<&crate::config::Config> for SchedulerConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            update_interval: config.update_interval,
            worker_pool_size: config.worker_pool_size,
            store_retry: RetryPolicy::default(),
            stats_log_every_cycles: config.stats_log_every_cycles,
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckNowError {
    #[error("unknown subscriber (telegram id {0})")]
    UnknownSubscriber(i64),

    #[error("subscriber (telegram id {0}) is not allowed to trigger a check")]
    NotPermitted(i64),

    #[error("check failed: {0:#}")]
    Failed(anyhow::Error),
}

/// Result of one partition unit
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartitionOutcome {
    Completed(PartitionReport),
    Failed { realm_id: RealmId, error: String },
}

impl PartitionOutcome {
    pub fn realm_id(&self) -> RealmId {
        match self {
            PartitionOutcome::Completed(report) => report.realm_id,
            PartitionOutcome::Failed { realm_id, .. } => *realm_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PartitionOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub partitions: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub evaluated: usize,
    pub fired: usize,
    pub skipped: usize,
    /// One entry per partition, ascending by realm id
    pub outcomes: Vec<PartitionOutcome>,
}

impl CycleSummary {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            partitions: 0,
            succeeded: 0,
            failed: 0,
            evaluated: 0,
            fired: 0,
            skipped: 0,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, outcome: PartitionOutcome) {
        self.partitions += 1;
        match &outcome {
            PartitionOutcome::Completed(report) => {
                self.succeeded += 1;
                self.evaluated += report.evaluated;
                self.fired += report.fired;
                self.skipped += report.skipped;
            }
            PartitionOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn outcome(&self, realm_id: RealmId) -> Option<&PartitionOutcome> {
        self.outcomes.iter().find(|o| o.realm_id() == realm_id)
    }
}

/// Per-partition tasks of one dispatched cycle
pub struct CycleHandle {
    started_at: DateTime<Utc>,
    tasks: Vec<(RealmId, JoinHandle<Result<PartitionReport>>)>,
}

impl CycleHandle {
    pub fn partitions(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every partition; errors and panics become failed outcomes
    pub async fn join(self) -> CycleSummary {
        let mut summary = CycleSummary::new(self.started_at);
        for (realm_id, task) in self.tasks {
            let outcome = match task.await {
                Ok(Ok(report)) => PartitionOutcome::Completed(report),
                Ok(Err(e)) => {
                    error!("Connected realm {} failed: {:#}", realm_id, e);
                    PartitionOutcome::Failed {
                        realm_id,
                        error: format!("{:#}", e),
                    }
                }
                Err(e) => {
                    error!("Connected realm {} task aborted: {}", realm_id, e);
                    PartitionOutcome::Failed {
                        realm_id,
                        error: e.to_string(),
                    }
                }
            };
            summary.record(outcome);
        }
        summary
    }
}

/// Group notifications by connected realm, ascending by realm id
pub fn group_by_partition(notifications: Vec<Notification>) -> BTreeMap<RealmId, Vec<Notification>> {
    let mut groups: BTreeMap<RealmId, Vec<Notification>> = BTreeMap::new();
    for notification in notifications {
        groups
            .entry(notification.realm_id)
            .or_default()
            .push(notification);
    }
    groups
}

pub struct Scheduler {
    store: Arc<dyn NotificationStore>,
    worker: Arc<PartitionWorker>,
    slots: Arc<Semaphore>,
    stats: Arc<CycleStats>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        worker: Arc<PartitionWorker>,
        config: SchedulerConfig,
        stats: Arc<CycleStats>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Self {
            store,
            worker,
            slots,
            stats,
            config,
        }
    }

    pub fn stats(&self) -> &Arc<CycleStats> {
        &self.stats
    }

    /// Load, group and spawn one cycle without waiting for it to finish
    pub async fn dispatch_cycle(&self) -> Result<CycleHandle> {
        let started_at = Utc::now();
        let notifications = execute_with_retry(
            || self.store.list_active_notifications(),
            &self.config.store_retry,
            is_retriable_db_error,
        )
        .await
        .context("Failed to load active notifications")?;

        let total = notifications.len();
        let groups = group_by_partition(notifications);
        info!(
            "Dispatching cycle: {} notifications across {} connected realms",
            total,
            groups.len()
        );

        let mut tasks = Vec::with_capacity(groups.len());
        for (realm_id, batch) in groups {
            let worker = self.worker.clone();
            let slots = self.slots.clone();
            let task = tokio::spawn(async move {
                let _permit = slots
                    .acquire_owned()
                    .await
                    .context("Worker pool closed")?;
                worker.process(realm_id, batch).await
            });
            tasks.push((realm_id, task));
        }

        Ok(CycleHandle { started_at, tasks })
    }

    /// Record a finished cycle and log totals every `stats_log_every_cycles`
    fn finish_cycle(&self, summary: &CycleSummary) {
        info!(
            "Cycle finished: {}/{} realms ok, {} fired, {} skipped",
            summary.succeeded, summary.partitions, summary.fired, summary.skipped
        );
        let cycles = self.stats.record(summary);
        if cycles % self.config.stats_log_every_cycles.max(1) == 0 {
            let s = self.stats.snapshot();
            info!(
                "Stats after {} cycles: realms ok={} failed={}, notifications evaluated={} fired={} skipped={}",
                s.cycles,
                s.partitions_succeeded,
                s.partitions_failed,
                s.notifications_evaluated,
                s.notifications_fired,
                s.notifications_skipped
            );
        }
    }

    /// Dispatch a cycle in the background, logging its summary on completion
    pub fn spawn_cycle(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            match scheduler.dispatch_cycle().await {
                Ok(handle) => {
                    let summary = handle.join().await;
                    scheduler.finish_cycle(&summary);
                }
                Err(e) => error!("Cycle not dispatched: {:#}", e),
            }
        })
    }

    /// Wait for interval discovery, then tick forever
    pub async fn run(self: Arc<Self>, ready: oneshot::Receiver<DiscoveryOutcome>) {
        match ready.await {
            Ok(outcome) => info!("Interval discovery finished: {}", outcome),
            Err(_) => warn!("Interval discovery ended without a result, starting schedule anyway"),
        }

        info!(
            "Scheduling cycles every {}s with {} workers",
            self.config.update_interval.as_secs(),
            self.config.worker_pool_size
        );
        let mut ticker = tokio::time::interval(self.config.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.spawn_cycle();
        }
    }

    /// Run exactly one cycle now, for an admin subscriber
    pub async fn check_now(&self, telegram_id: i64) -> Result<CycleSummary, CheckNowError> {
        let subscriber = self
            .store
            .lookup_subscriber_by_telegram(telegram_id)
            .await
            .map_err(CheckNowError::Failed)?
            .ok_or(CheckNowError::UnknownSubscriber(telegram_id))?;

        if !subscriber.is_admin() {
            warn!("Subscriber {} asked for a manual check without permission", subscriber.id);
            return Err(CheckNowError::NotPermitted(telegram_id));
        }

        info!("Manual check requested by subscriber {}", subscriber.id);
        let handle = self.dispatch_cycle().await.map_err(CheckNowError::Failed)?;
        let summary = handle.join().await;
        self.finish_cycle(&summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_watch_core::models::NotificationKind;

    fn notification(id: i64, realm_id: RealmId) -> Notification {
        Notification {
            id,
            subscriber_id: 1,
            realm_id,
            item_id: 2589,
            kind: NotificationKind::ThresholdPrice,
            price: 100,
            value: 1,
        }
    }

    #[test]
    fn test_group_by_partition() {
        let groups = group_by_partition(vec![
            notification(1, 20),
            notification(2, 10),
            notification(3, 20),
        ]);
        let realms: Vec<RealmId> = groups.keys().copied().collect();
        assert_eq!(realms, vec![10, 20]);
        assert_eq!(groups[&20].len(), 2);
        assert_eq!(groups[&10][0].id, 2);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = CycleSummary::new(Utc::now());
        summary.record(PartitionOutcome::Completed(PartitionReport {
            realm_id: 1,
            evaluated: 3,
            fired: 2,
            skipped: 1,
        }));
        summary.record(PartitionOutcome::Failed {
            realm_id: 2,
            error: "boom".to_string(),
        });

        assert_eq!(summary.partitions, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.fired, 2);
        assert!(summary.outcome(1).unwrap().is_success());
        assert!(!summary.outcome(2).unwrap().is_success());
        assert!(summary.outcome(3).is_none());
    }

    #[test]
    fn test_stats_accumulate() {
        let stats = CycleStats::new();
        let mut summary = CycleSummary::new(Utc::now());
        summary.record(PartitionOutcome::Completed(PartitionReport {
            realm_id: 1,
            evaluated: 4,
            fired: 1,
            skipped: 0,
        }));

        assert_eq!(stats.record(&summary), 1);
        assert_eq!(stats.record(&summary), 2);
        let s = stats.snapshot();
        assert_eq!(s.cycles, 2);
        assert_eq!(s.partitions_succeeded, 2);
        assert_eq!(s.notifications_evaluated, 8);
        assert_eq!(s.notifications_fired, 2);
    }
}
