//! Quote field table: field name to typed accessor, built once per depth.
//!
//! Scalar fields read one value from a tick. Level fields (`BidPrice`, `BidQty`,
//! `AskPrice`, `AskQty`) expand to one field per book level, numbered from 1, so a
//! depth of 5 yields `BidPrice1` through `BidPrice5`. The order of `names()` is
//! the order of values in every quote cache entry.
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::gateway::QuoteTick;

/// One field value delivered to a topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuoteValue {
    /// Prices and quantities.
    Number(f64),
    /// Timestamps.
    Text(String),
}

impl fmt::Display for QuoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteValue::Number(n) => write!(f, "{}", n),
            QuoteValue::Text(t) => write!(f, "{}", t),
        }
    }
}

type ScalarAccessor = fn(&QuoteTick) -> QuoteValue;
type LevelAccessor = fn(&QuoteTick, usize) -> QuoteValue;

fn level_price(levels: &[f64], i: usize) -> QuoteValue {
    QuoteValue::Number(levels.get(i).copied().unwrap_or(0.0))
}

fn level_qty(levels: &[u64], i: usize) -> QuoteValue {
    QuoteValue::Number(levels.get(i).copied().unwrap_or(0) as f64)
}

const SCALAR_FIELDS: [(&str, ScalarAccessor); 8] = [
    ("Timestamp", |t| QuoteValue::Text(t.timestamp.clone())),
    ("LastPrice", |t| QuoteValue::Number(t.last_price)),
    ("LastQty", |t| QuoteValue::Number(t.last_qty as f64)),
    ("Volume", |t| QuoteValue::Number(t.volume as f64)),
    ("ImpliedBidPrice", |t| QuoteValue::Number(t.implied_bid_price)),
    ("ImpliedBidQty", |t| QuoteValue::Number(t.implied_bid_qty as f64)),
    ("ImpliedAskPrice", |t| QuoteValue::Number(t.implied_ask_price)),
    ("ImpliedAskQty", |t| QuoteValue::Number(t.implied_ask_qty as f64)),
];

const LEVEL_FIELDS: [(&str, LevelAccessor); 4] = [
    ("BidPrice", |t, i| level_price(&t.bid_prices, i)),
    ("BidQty", |t, i| level_qty(&t.bid_qtys, i)),
    ("AskPrice", |t, i| level_price(&t.ask_prices, i)),
    ("AskQty", |t, i| level_qty(&t.ask_qtys, i)),
];

#[derive(Clone, Copy)]
enum Accessor {
    Scalar(ScalarAccessor),
    Level(LevelAccessor, usize),
}

impl Accessor {
    fn read(self, tick: &QuoteTick) -> QuoteValue {
        match self {
            Accessor::Scalar(read) => read(tick),
            Accessor::Level(read, level) => read(tick, level),
        }
    }
}

/// Ordered field names with their accessors for one market depth.
pub struct FieldTable {
    names: Vec<String>,
    accessors: Vec<Accessor>,
    index: HashMap<String, usize>,
}

impl FieldTable {
    /// Build the table for `depth` book levels.
    pub fn new(depth: usize) -> Self {
        let mut names = Vec::with_capacity(SCALAR_FIELDS.len() + LEVEL_FIELDS.len() * depth);
        let mut accessors = Vec::with_capacity(names.capacity());

        for (name, read) in SCALAR_FIELDS {
            names.push(String::from(name));
            accessors.push(Accessor::Scalar(read));
        }
        for (name, read) in LEVEL_FIELDS {
            for level in 0..depth {
                names.push(format!("{}{}", name, level + 1));
                accessors.push(Accessor::Level(read, level));
            }
        }

        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        FieldTable {
            names,
            accessors,
            index,
        }
    }

    /// All field names in cache-entry order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of `field` in a cache entry.
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }

    /// Read every tracked field of `tick`, in table order.
    pub fn extract(&self, tick: &QuoteTick) -> Vec<QuoteValue> {
        self.accessors.iter().map(|a| a.read(tick)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_expands_levels_after_scalars() {
        let table = FieldTable::new(3);
        assert_eq!(table.names().len(), 8 + 4 * 3);
        assert_eq!(table.index_of("Timestamp"), Some(0));
        assert_eq!(table.index_of("BidPrice1"), Some(8));
        assert_eq!(table.index_of("BidPrice3"), Some(10));
        assert_eq!(table.index_of("AskQty3"), Some(19));
        assert_eq!(table.index_of("BidPrice4"), None);
        assert_eq!(table.index_of("bidprice1"), None);
    }

    #[test]
    fn extract_reads_typed_values_and_pads_missing_levels() {
        let table = FieldTable::new(2);
        let tick = QuoteTick {
            timestamp: String::from("09:30:00.500"),
            last_price: 101.5,
            volume: 42,
            bid_prices: vec![101.25],
            bid_qtys: vec![7],
            ..QuoteTick::default()
        };
        let values = table.extract(&tick);
        assert_eq!(values.len(), table.names().len());
        assert_eq!(values[0], QuoteValue::Text(String::from("09:30:00.500")));
        assert_eq!(values[table.index_of("LastPrice").unwrap()], QuoteValue::Number(101.5));
        assert_eq!(values[table.index_of("Volume").unwrap()], QuoteValue::Number(42.0));
        assert_eq!(values[table.index_of("BidPrice1").unwrap()], QuoteValue::Number(101.25));
        assert_eq!(values[table.index_of("BidPrice2").unwrap()], QuoteValue::Number(0.0));
        assert_eq!(values[table.index_of("BidQty1").unwrap()], QuoteValue::Number(7.0));
    }
}
