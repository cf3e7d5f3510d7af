//! auction_watch_rust - polls auction house listings and notifies subscribers
//! when their price conditions hold

pub mod admin;
pub mod config;
pub mod discovery;
pub mod scheduler;
pub mod stats;
pub mod worker;

pub use config::Config;
pub use discovery::{DiscoveryConfig, DiscoveryOutcome, IntervalDiscoverer};
pub use scheduler::{CheckNowError, CycleHandle, CycleSummary, PartitionOutcome, Scheduler, SchedulerConfig};
pub use stats::CycleStats;
pub use worker::{PartitionReport, PartitionWorker};
