//! Market data provider abstractions
//!
//! Defines the MarketDataProvider trait the polling core depends on, so the
//! concrete auction house client can be swapped for a fake in tests or
//! wrapped with retry behaviour.

use crate::models::{ConnectedRealm, Fingerprint, ItemId, Snapshot};
use async_trait::async_trait;
use thiserror::Error;

pub mod retrying;

pub use retrying::RetryingProvider;

/// Errors surfaced by a market data provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Access token rejected or expired; the client dropped it and a retry
    /// will fetch a fresh one
    #[error("access token expired or rejected")]
    Unauthorized,

    #[error("rate limited by upstream API")]
    RateLimited,

    #[error("upstream API returned status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),

    /// Token endpoint refused the client credentials
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ProviderError {
    /// Whether another attempt may succeed without outside intervention
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Unauthorized
            | ProviderError::RateLimited
            | ProviderError::Network(_) => true,
            ProviderError::Http { status, .. } => *status >= 500,
            ProviderError::Decode(_) | ProviderError::CircuitOpen(_) | ProviderError::Auth(_) => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Source of auction house listings
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Current listings of `item_ids` in `realm`, each ascending by price.
    /// Items without listings are absent from the snapshot.
    async fn fetch_snapshot(
        &self,
        realm: &ConnectedRealm,
        item_ids: &[ItemId],
    ) -> Result<Snapshot, ProviderError>;

    /// Version token of the realm's current auction data, if the upstream
    /// exposes one
    async fn fetch_fingerprint(
        &self,
        realm: &ConnectedRealm,
    ) -> Result<Option<Fingerprint>, ProviderError>;

    /// Provider name for logging and debugging
    fn provider_name(&self) -> &str;
}
