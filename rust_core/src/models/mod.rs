// Shared models for auction watch services
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type ItemId = i64;
pub type RealmId = i64;
pub type SubscriberId = i64;
pub type NotificationId = i64;

// ============================================================================
// Notifications
// ============================================================================

/// Matching policy a notification is evaluated with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Enough quantity listed at or under the threshold price
    ThresholdPrice,
    /// Any lot listed at or under the threshold price
    MarketPrice,
    /// Enough quantity whose running average stays at or under the threshold
    AveragePrice,
}

impl NotificationKind {
    /// Integer code used in the `notifications.kind` column
    pub fn code(&self) -> i16 {
        match self {
            Self::ThresholdPrice => 0,
            Self::MarketPrice => 1,
            Self::AveragePrice => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::ThresholdPrice),
            1 => Some(Self::MarketPrice),
            2 => Some(Self::AveragePrice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThresholdPrice => "threshold_price",
            Self::MarketPrice => "market_price",
            Self::AveragePrice => "average_price",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscriber's standing price/quantity condition on one item in one realm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub subscriber_id: SubscriberId,
    pub realm_id: RealmId,
    pub item_id: ItemId,
    pub kind: NotificationKind,
    /// Threshold price in copper
    pub price: u64,
    /// Quantity threshold; ignored for `MarketPrice`
    pub value: u64,
}

// ============================================================================
// Market data
// ============================================================================

/// A sellable quantity at one unit price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Unit price in copper
    pub price: u64,
    pub quantity: u64,
}

impl Lot {
    pub fn new(price: u64, quantity: u64) -> Self {
        Self { price, quantity }
    }
}

/// Current listings of a set of items in one realm.
///
/// Every lot sequence is kept ascending by unit price; the constructors sort,
/// so consumers may rely on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    lots: HashMap<ItemId, Vec<Lot>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `(item, lot)` pairs by item and sort each group by price
    pub fn from_lots<I>(lots: I) -> Self
    where
        I: IntoIterator<Item = (ItemId, Lot)>,
    {
        let mut grouped: HashMap<ItemId, Vec<Lot>> = HashMap::new();
        for (item_id, lot) in lots {
            grouped.entry(item_id).or_default().push(lot);
        }
        for item_lots in grouped.values_mut() {
            item_lots.sort_by_key(|lot| lot.price);
        }
        Self { lots: grouped }
    }

    /// Replace the listings of one item
    pub fn insert(&mut self, item_id: ItemId, mut lots: Vec<Lot>) {
        lots.sort_by_key(|lot| lot.price);
        self.lots.insert(item_id, lots);
    }

    /// Ascending lots for an item; empty when the item has no listings
    pub fn lots(&self, item_id: ItemId) -> &[Lot] {
        self.lots.get(&item_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn item_count(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

/// Opaque version token of a realm's auction data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Store records
// ============================================================================

/// A connected realm: the partition provider calls are batched by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedRealm {
    pub id: RealmId,
    pub region: String,
    pub slug: String,
    pub name: String,
}

impl ConnectedRealm {
    pub fn display_name(&self) -> String {
        format!("{}-{}", self.region.to_uppercase(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub telegram_id: i64,
    /// 0 = user, 1 = admin
    pub level: i32,
}

impl Subscriber {
    pub fn is_admin(&self) -> bool {
        self.level >= 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
}

// ============================================================================
// Match results
// ============================================================================

/// Outcome of evaluating one notification against one item's lots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchResult {
    pub fired: bool,
    /// Quantity the reported price covers
    pub quantity: u64,
    /// Weighted average or minimum price in copper, depending on kind
    pub price: u64,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self::default()
    }
}

/// Everything a sink needs to tell a subscriber a condition holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlert {
    pub notification_id: NotificationId,
    pub realm_name: String,
    pub item_id: ItemId,
    pub item_name: String,
    pub kind: NotificationKind,
    pub threshold: u64,
    pub value: u64,
    pub result: MatchResult,
}
