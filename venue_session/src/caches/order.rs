//! Order cache: last write wins per order id.
use std::collections::BTreeMap;
use std::sync::Mutex;

use venue_common::Result;
use venue_common::records::OrderRecord;

/// Orders keyed by venue order number.
#[derive(Default)]
pub struct OrderCache {
    orders: Mutex<BTreeMap<String, OrderRecord>>,
}

impl OrderCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole record stored under its order id.
    pub fn upsert(&self, record: OrderRecord) -> Result<()> {
        let mut orders = self.orders.lock()?;
        orders.insert(record.order_id.clone(), record);
        Ok(())
    }

    /// Point-in-time copy, ordered by order id.
    pub fn snapshot(&self) -> Result<Vec<OrderRecord>> {
        let orders = self.orders.lock()?;
        Ok(orders.values().cloned().collect())
    }

    /// One order by id.
    pub fn get(&self, order_id: &str) -> Result<Option<OrderRecord>> {
        let orders = self.orders.lock()?;
        Ok(orders.get(order_id).cloned())
    }

    /// Number of cached orders.
    pub fn count(&self) -> Result<usize> {
        Ok(self.orders.lock()?.len())
    }
}
