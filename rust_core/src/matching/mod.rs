//! Price matching engine
//!
//! Evaluates one notification against one item's current lots. The lot slice
//! must be ascending by unit price (guaranteed when it comes from a
//! [`Snapshot`]). Evaluation is pure: the same lots and notification always
//! give the same result, and nothing is remembered between cycles.

use crate::models::{Lot, MatchResult, Notification, NotificationKind, Snapshot};

mod average;
mod market;
mod threshold;

pub use average::average_price;
pub use market::market_price;
pub use threshold::threshold_price;

impl NotificationKind {
    /// Run this kind's policy over ascending `lots`
    pub fn evaluate(&self, lots: &[Lot], threshold: u64, value: u64) -> MatchResult {
        match self {
            NotificationKind::ThresholdPrice => threshold_price(lots, threshold, value),
            NotificationKind::MarketPrice => market_price(lots, threshold),
            NotificationKind::AveragePrice => average_price(lots, threshold, value),
        }
    }
}

/// Evaluate a notification against its item's lots in `snapshot`
pub fn evaluate_notification(notification: &Notification, snapshot: &Snapshot) -> MatchResult {
    let lots = snapshot.lots(notification.item_id);
    if lots.is_empty() {
        return MatchResult::no_match();
    }
    notification
        .kind
        .evaluate(lots, notification.price, notification.value)
}

/// Truncated quantity-weighted average; zero when nothing was accumulated
fn weighted_average(total_cost: u128, quantity: u64) -> u64 {
    if quantity == 0 {
        return 0;
    }
    (total_cost / quantity as u128) as u64
}
