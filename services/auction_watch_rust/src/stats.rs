//! Cycle statistics

use crate::scheduler::CycleSummary;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals across every completed cycle, periodic and manual
#[derive(Debug, Default)]
pub struct CycleStats {
    cycles: AtomicU64,
    partitions_succeeded: AtomicU64,
    partitions_failed: AtomicU64,
    notifications_evaluated: AtomicU64,
    notifications_fired: AtomicU64,
    notifications_skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStatsSnapshot {
    pub cycles: u64,
    pub partitions_succeeded: u64,
    pub partitions_failed: u64,
    pub notifications_evaluated: u64,
    pub notifications_fired: u64,
    pub notifications_skipped: u64,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a finished cycle in; returns the number of cycles recorded so far
    pub fn record(&self, summary: &CycleSummary) -> u64 {
        self.partitions_succeeded
            .fetch_add(summary.succeeded as u64, Ordering::Relaxed);
        self.partitions_failed
            .fetch_add(summary.failed as u64, Ordering::Relaxed);
        self.notifications_evaluated
            .fetch_add(summary.evaluated as u64, Ordering::Relaxed);
        self.notifications_fired
            .fetch_add(summary.fired as u64, Ordering::Relaxed);
        self.notifications_skipped
            .fetch_add(summary.skipped as u64, Ordering::Relaxed);
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> CycleStatsSnapshot {
        CycleStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            partitions_succeeded: self.partitions_succeeded.load(Ordering::Relaxed),
            partitions_failed: self.partitions_failed.load(Ordering::Relaxed),
            notifications_evaluated: self.notifications_evaluated.load(Ordering::Relaxed),
            notifications_fired: self.notifications_fired.load(Ordering::Relaxed),
            notifications_skipped: self.notifications_skipped.load(Ordering::Relaxed),
        }
    }
}
