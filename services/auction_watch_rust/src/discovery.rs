//! Startup interval discovery
//!
//! The auction house refresh cadence is not published. Before the first
//! cycle we watch one connected realm's data fingerprint until it changes, so
//! the schedule starts right after a refresh instead of at an arbitrary
//! offset. The probe is bounded: each attempt takes at most one probe
//! interval, so discovery ends within `max_attempts * probe_interval` even if
//! the fingerprint never moves. Every failure counts as "unchanged".

use auction_watch_core::db::NotificationStore;
use auction_watch_core::models::{ConnectedRealm, Fingerprint};
use auction_watch_core::providers::MarketDataProvider;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, timeout_at, Instant};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub probe_interval: Duration,
    pub max_attempts: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(60),
            max_attempts: 60,
        }
    }
}

impl From<&crate::config::Config> for DiscoveryConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            probe_interval: config.discovery_probe_interval,
            max_attempts: config.discovery_max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// No connected realm known yet, nothing to probe
    Skipped,
    /// The fingerprint changed on attempt `attempts`
    Refreshed { attempts: u32, elapsed: Duration },
    /// Attempt budget spent without seeing a change
    Exhausted { attempts: u32 },
}

impl fmt::Display for DiscoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryOutcome::Skipped => write!(f, "skipped (no connected realms)"),
            DiscoveryOutcome::Refreshed { attempts, elapsed } => write!(
                f,
                "data refreshed after {} probes ({}s)",
                attempts,
                elapsed.as_secs()
            ),
            DiscoveryOutcome::Exhausted { attempts } => {
                write!(f, "no refresh seen in {} probes", attempts)
            }
        }
    }
}

pub struct IntervalDiscoverer {
    store: Arc<dyn NotificationStore>,
    provider: Arc<dyn MarketDataProvider>,
    config: DiscoveryConfig,
}

impl IntervalDiscoverer {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        provider: Arc<dyn MarketDataProvider>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Run discovery in a detached task; the receiver yields its outcome
    pub fn spawn(self) -> oneshot::Receiver<DiscoveryOutcome> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = self.discover().await;
            if tx.send(outcome).is_err() {
                debug!("Interval discovery finished after the scheduler stopped waiting");
            }
        });
        rx
    }

    pub async fn discover(&self) -> DiscoveryOutcome {
        let Some(realm) = self.pick_partition().await else {
            info!("No connected realms known, skipping interval discovery");
            return DiscoveryOutcome::Skipped;
        };

        info!(
            "Probing {} for an auction data refresh (every {}s, at most {} probes)",
            realm.display_name(),
            self.config.probe_interval.as_secs(),
            self.config.max_attempts
        );

        let started = Instant::now();
        let mut previous: Option<Fingerprint> = None;
        for attempt in 1..=self.config.max_attempts {
            let deadline = Instant::now() + self.config.probe_interval;

            match timeout_at(deadline, self.provider.fetch_fingerprint(&realm)).await {
                Ok(Ok(Some(current))) => {
                    if previous.as_ref().is_some_and(|p| *p != current) {
                        let elapsed = started.elapsed();
                        info!(
                            "{} refreshed to {} after {} probes",
                            realm.display_name(),
                            current,
                            attempt
                        );
                        return DiscoveryOutcome::Refreshed { attempts: attempt, elapsed };
                    }
                    debug!("Probe {}: fingerprint {}", attempt, current);
                    previous = Some(current);
                }
                Ok(Ok(None)) => debug!("Probe {}: no fingerprint available", attempt),
                Ok(Err(e)) => warn!("Probe {} failed: {}", attempt, e),
                Err(_) => warn!("Probe {} timed out", attempt),
            }

            if attempt < self.config.max_attempts {
                sleep_until(deadline).await;
            }
        }

        warn!(
            "No auction data refresh seen on {} after {} probes, starting anyway",
            realm.display_name(),
            self.config.max_attempts
        );
        DiscoveryOutcome::Exhausted {
            attempts: self.config.max_attempts,
        }
    }

    /// Uniformly random known realm; a store failure counts as none known
    async fn pick_partition(&self) -> Option<ConnectedRealm> {
        let partitions = match self.store.list_partitions().await {
            Ok(partitions) => partitions,
            Err(e) => {
                warn!("Failed to list connected realms: {:#}", e);
                return None;
            }
        };
        partitions.choose(&mut rand::thread_rng()).cloned()
    }
}
