//! Notification delivery
//!
//! A sink turns a fired [`PriceAlert`] into a message for its subscriber.
//! Delivery is best effort: sinks log their own failures and never fail the
//! partition that produced the alert. Amounts are rendered in copper.

use crate::models::{NotificationKind, PriceAlert, Subscriber};
use async_trait::async_trait;

pub mod telegram;

pub use telegram::TelegramSink;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, subscriber: &Subscriber, alert: &PriceAlert);
}

/// Plain-text body of an alert
pub fn alert_text(alert: &PriceAlert) -> String {
    let header = format!("{} @ {}", alert.item_name, alert.realm_name);
    let body = match alert.kind {
        NotificationKind::ThresholdPrice => format!(
            "{} available at or below {}c, average {}c",
            alert.result.quantity,
            alert.threshold,
            alert.result.price
        ),
        NotificationKind::MarketPrice => format!(
            "lowest price is {}c ({} in lot), threshold {}c",
            alert.result.price,
            alert.result.quantity,
            alert.threshold
        ),
        NotificationKind::AveragePrice => format!(
            "{} can be bought at an average of {}c (threshold {}c, wanted {})",
            alert.result.quantity,
            alert.result.price,
            alert.threshold,
            alert.value
        ),
    };
    format!("{}\n{}", header, body)
}
