use super::weighted_average;
use crate::models::{Lot, MatchResult};

/// Accumulate the cheapest lots priced at or under `threshold`.
///
/// Qualifying lots form a prefix of the ascending slice, so the scan stops at
/// the first lot above the threshold. Fires when the prefix holds at least
/// `value` units; the reported price is the prefix's truncated weighted average.
pub fn threshold_price(lots: &[Lot], threshold: u64, value: u64) -> MatchResult {
    let mut quantity: u64 = 0;
    let mut total_cost: u128 = 0;

    for lot in lots.iter().take_while(|lot| lot.price <= threshold) {
        quantity = quantity.saturating_add(lot.quantity);
        total_cost += lot.price as u128 * lot.quantity as u128;
    }

    MatchResult {
        fired: quantity > 0 && quantity >= value,
        quantity,
        price: weighted_average(total_cost, quantity),
    }
}
