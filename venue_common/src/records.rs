//! Execution and account records mirrored from the venue.
//!
//! These are the values held by the reference caches. Orders are keyed by order id
//! and replaced wholesale; fills are keyed by their match id and inserted once;
//! positions are keyed by `EntityKey`; the fund snapshot is a single record.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::instruments::{EntityKey, OrderState, OrderType, Side};

/// One order as last reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Venue order number; cache key.
    pub order_id: String,
    /// Exchange/commodity/contract of the order.
    pub entity: EntityKey,
    /// Market or limit.
    pub order_type: OrderType,
    /// Buy or sell.
    pub side: Side,
    /// Limit price; meaningless for market orders.
    pub price: f64,
    /// Ordered quantity.
    pub quantity: u32,
    /// Venue lifecycle state.
    pub state: OrderState,
    /// Venue-formatted insertion time.
    pub inserted_at: String,
    /// Venue-formatted time of the last update.
    pub updated_at: String,
    /// Quantity matched so far.
    pub matched_quantity: u32,
}

/// One execution (match) reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    /// Venue match number; natural dedup key.
    pub fill_id: String,
    /// Order the fill belongs to.
    pub order_id: String,
    /// Exchange/commodity/contract of the fill.
    pub entity: EntityKey,
    /// Buy or sell.
    pub side: Side,
    /// Match price.
    pub price: f64,
    /// Matched quantity.
    pub quantity: u32,
    /// Venue-formatted match time.
    pub timestamp: String,
}

/// How a position report must be folded into its aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PositionPolicy {
    /// Add the signed quantity of every reported lot.
    Accumulate,
    /// Overwrite with the reported net summary.
    Replace,
}

/// A position lot or net summary pushed by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// Exchange/commodity/contract of the position.
    pub entity: EntityKey,
    /// Side of the lot or summary.
    pub side: Side,
    /// Unsigned quantity as reported.
    pub quantity: u32,
    /// Whether this is one lot (accumulate) or a net summary (replace).
    pub policy: PositionPolicy,
}

impl PositionReport {
    /// Quantity with the side applied: buys positive, sells negative.
    pub fn signed_quantity(&self) -> i64 {
        self.side.multiplier() * i64::from(self.quantity)
    }
}

/// Account funds, replaced wholesale on every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundSnapshot {
    /// Account balance.
    pub balance: f64,
    /// Equity including open P&L.
    pub equity: f64,
    /// Funds available for new orders.
    pub available: f64,
    /// Market value of held positions.
    pub market_equity: f64,
}

/// Reference data streams queried once after the session becomes ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum QueryKind {
    /// Outstanding orders only.
    Orders,
    /// Fills of the trading day.
    Fills,
    /// Position lots or summaries.
    Positions,
    /// Fund snapshot.
    Funds,
}
