//! Retry wrapper for market data providers
//!
//! Retries transient provider failures (expired token, rate limiting,
//! network errors) with a bounded attempt count. Exhausting the budget
//! returns the last error to the caller.

use super::{MarketDataProvider, ProviderError};
use crate::models::{ConnectedRealm, Fingerprint, ItemId, Snapshot};
use crate::retry::{execute_with_retry, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;

pub struct RetryingProvider {
    inner: Arc<dyn MarketDataProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn MarketDataProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl MarketDataProvider for RetryingProvider {
    async fn fetch_snapshot(
        &self,
        realm: &ConnectedRealm,
        item_ids: &[ItemId],
    ) -> Result<Snapshot, ProviderError> {
        execute_with_retry(
            || self.inner.fetch_snapshot(realm, item_ids),
            &self.policy,
            ProviderError::is_transient,
        )
        .await
    }

    async fn fetch_fingerprint(
        &self,
        realm: &ConnectedRealm,
    ) -> Result<Option<Fingerprint>, ProviderError> {
        execute_with_retry(
            || self.inner.fetch_fingerprint(realm),
            &self.policy,
            ProviderError::is_transient,
        )
        .await
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}
