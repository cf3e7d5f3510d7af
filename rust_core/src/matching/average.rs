use super::weighted_average;
use crate::models::{Lot, MatchResult};

/// Greedily buy up the cheapest lots while the running weighted average stays
/// at or under `threshold`.
///
/// Each lot is merged into a candidate average; the lot is committed only if
/// the candidate is within the threshold, otherwise the scan stops. A later,
/// larger and cheaper lot is never considered after the first rejection.
/// Fires when the committed quantity reaches `value`.
pub fn average_price(lots: &[Lot], threshold: u64, value: u64) -> MatchResult {
    let mut quantity: u64 = 0;
    let mut total_cost: u128 = 0;

    for lot in lots {
        let candidate_quantity = quantity.saturating_add(lot.quantity);
        if candidate_quantity == 0 {
            continue;
        }
        let candidate_cost = total_cost + lot.price as u128 * lot.quantity as u128;
        if weighted_average(candidate_cost, candidate_quantity) > threshold {
            break;
        }
        quantity = candidate_quantity;
        total_cost = candidate_cost;
    }

    MatchResult {
        fired: quantity > 0 && quantity >= value,
        quantity,
        price: weighted_average(total_cost, quantity),
    }
}
