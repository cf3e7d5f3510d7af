use crate::models::{Lot, MatchResult};

/// Fire when any lot is priced at or under `threshold`, reporting the
/// cheapest qualifying price and its quantity.
///
/// The minimum is tracked explicitly instead of taking the first lot, so an
/// unsorted slice still reports the right price among the scanned prefix.
pub fn market_price(lots: &[Lot], threshold: u64) -> MatchResult {
    let mut cheapest: Option<Lot> = None;

    for lot in lots.iter().take_while(|lot| lot.price <= threshold) {
        match cheapest {
            Some(best) if best.price <= lot.price => {}
            _ => cheapest = Some(*lot),
        }
    }

    match cheapest {
        Some(lot) => MatchResult {
            fired: true,
            quantity: lot.quantity,
            price: lot.price,
        },
        None => MatchResult::no_match(),
    }
}
