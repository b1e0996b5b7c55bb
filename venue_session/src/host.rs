//! Synchronous function surface for a spreadsheet-style host.
//!
//! Every function returns either a payload or an `#ERR: `-prefixed message, which
//! is how the host displays failures in place of a value.
use std::sync::Arc;

use serde::Serialize;
use venue_common::instruments::{EntityKey, OrderType, PositionEffect};
use venue_common::{OrderRequest, VenueError};

use crate::quotes::{QuoteValue, TopicSubscription};
use crate::session::SessionController;

/// One table cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// Text cell.
    Text(String),
    /// Numeric cell.
    Number(f64),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(String::from(value))
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<QuoteValue> for Cell {
    fn from(value: QuoteValue) -> Self {
        match value {
            QuoteValue::Number(n) => Cell::Number(n),
            QuoteValue::Text(t) => Cell::Text(t),
        }
    }
}

/// Column headers plus rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    /// Header row.
    pub columns: Vec<String>,
    /// Data rows, each as wide as `columns`.
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    fn new(columns: &[&str]) -> Self {
        Table {
            columns: columns.iter().map(|c| String::from(*c)).collect(),
            rows: Vec::new(),
        }
    }
}

/// Successful result of a host function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HostValue {
    /// Status text.
    Text(String),
    /// Flag.
    Bool(bool),
    /// Scalar.
    Number(f64),
    /// Table.
    Table(Table),
}

/// Host-facing result: payload or `#ERR:` text.
pub type HostResult<T = HostValue> = std::result::Result<T, String>;

const ORDER_COLUMNS: [&str; 12] = [
    "OrderNo",
    "Exchange",
    "Commodity",
    "Contract",
    "Type",
    "Side",
    "Price",
    "Quantity",
    "State",
    "PlacedTime",
    "UpdatedTime",
    "FilledQty",
];
const FILL_COLUMNS: [&str; 9] = [
    "SeqNo",
    "OrderNo",
    "Exchange",
    "Commodity",
    "Contract",
    "Side",
    "Price",
    "Quantity",
    "Timestamp",
];
const POSITION_COLUMNS: [&str; 4] = ["Exchange", "Commodity", "Contract", "Quantity"];
const FUND_COLUMNS: [&str; 4] = ["Balance", "Equity", "Available", "MarketEquity"];

fn host_err(e: VenueError) -> String {
    format!("#ERR: {}", e)
}

/// Host functions bound to one session.
pub struct HostSurface {
    session: Arc<SessionController>,
}

impl HostSurface {
    /// Surface over `session`.
    pub fn new(session: Arc<SessionController>) -> Self {
        HostSurface { session }
    }

    /// Log in and sweep reference data.
    pub fn login(&self) -> HostResult {
        self.session.login().map_err(host_err)?;
        Ok(HostValue::Text(String::from("API is ready.")))
    }

    /// Log out, keeping caches.
    pub fn logout(&self) -> HostResult {
        self.session.logout().map_err(host_err)?;
        Ok(HostValue::Text(String::from("API is logged out.")))
    }

    /// Whether the session is logged in.
    pub fn is_connected(&self) -> HostResult {
        Ok(HostValue::Bool(self.session.is_connected()))
    }

    /// Submit an order for `entity` (`EX,COMM,CONTRACT` or `EX,INSTRUMENT`).
    ///
    /// The side comes from `is_buy`; a signed `quantity` is taken by magnitude.
    pub fn send_order(
        &self,
        entity: &str,
        is_market: bool,
        is_buy: bool,
        price: f64,
        quantity: i64,
        effect: PositionEffect,
    ) -> HostResult {
        let entity: EntityKey = entity.parse().map_err(host_err)?;
        let order = OrderRequest::new(
            self.session.account(),
            entity,
            is_market,
            is_buy,
            effect,
            price,
            quantity,
        );
        self.session.commands().submit(&order).map_err(host_err)?;
        Ok(HostValue::Text(String::from("Success!")))
    }

    /// Cancel an order by venue order number.
    pub fn cancel_order(&self, order_id: &str) -> HostResult {
        self.session.commands().cancel(order_id).map_err(host_err)?;
        Ok(HostValue::Text(String::from("Success!")))
    }

    /// Cached orders.
    pub fn query_orders(&self) -> HostResult {
        self.ensure_connected()?;
        let orders = self.session.caches().orders.snapshot().map_err(host_err)?;
        let mut table = Table::new(&ORDER_COLUMNS);
        for o in orders {
            let price = match o.order_type {
                OrderType::Market => 0.0,
                OrderType::Limit => o.price,
            };
            table.rows.push(vec![
                Cell::from(o.order_id),
                Cell::from(o.entity.exchange),
                Cell::from(o.entity.commodity),
                Cell::from(o.entity.contract),
                Cell::from(o.order_type.to_string()),
                Cell::from(o.side.to_string()),
                Cell::from(price),
                Cell::from(f64::from(o.quantity)),
                Cell::from(o.state.to_string()),
                Cell::from(o.inserted_at),
                Cell::from(o.updated_at),
                Cell::from(f64::from(o.matched_quantity)),
            ]);
        }
        Ok(HostValue::Table(table))
    }

    /// Cached fills.
    pub fn query_fills(&self) -> HostResult {
        self.ensure_connected()?;
        let fills = self.session.caches().fills.snapshot().map_err(host_err)?;
        let mut table = Table::new(&FILL_COLUMNS);
        for f in fills {
            table.rows.push(vec![
                Cell::from(f.fill_id),
                Cell::from(f.order_id),
                Cell::from(f.entity.exchange),
                Cell::from(f.entity.commodity),
                Cell::from(f.entity.contract),
                Cell::from(f.side.to_string()),
                Cell::from(f.price),
                Cell::from(f64::from(f.quantity)),
                Cell::from(f.timestamp),
            ]);
        }
        Ok(HostValue::Table(table))
    }

    /// Net positions.
    pub fn position_summary(&self) -> HostResult {
        self.ensure_connected()?;
        let positions = self.session.caches().positions.snapshot().map_err(host_err)?;
        let mut table = Table::new(&POSITION_COLUMNS);
        for p in positions {
            table.rows.push(vec![
                Cell::from(p.entity.exchange),
                Cell::from(p.entity.commodity),
                Cell::from(p.entity.contract),
                Cell::from(p.net_quantity as f64),
            ]);
        }
        Ok(HostValue::Table(table))
    }

    /// Account funds as a one-row table.
    pub fn fund_summary(&self) -> HostResult {
        self.ensure_connected()?;
        let funds = self.session.caches().funds.snapshot().map_err(host_err)?;
        let mut table = Table::new(&FUND_COLUMNS);
        table.rows.push(vec![
            Cell::from(funds.balance),
            Cell::from(funds.equity),
            Cell::from(funds.available),
            Cell::from(funds.market_equity),
        ]);
        Ok(HostValue::Table(table))
    }

    /// Names accepted by `quote_details`, one per row.
    pub fn quote_fields(&self) -> HostResult {
        let mut table = Table::new(&["Field"]);
        for name in self.session.quotes().field_names() {
            table.rows.push(vec![Cell::from(name.clone())]);
        }
        Ok(HostValue::Table(table))
    }

    /// Register a live topic for one field of `entity`.
    pub fn quote_details(&self, entity: &str, field: &str) -> HostResult<TopicSubscription> {
        let entity: EntityKey = entity.parse().map_err(host_err)?;
        self.session.quotes().register_topic(&entity, field).map_err(host_err)
    }

    /// Change the login password.
    pub fn change_password(&self, old_password: &str, new_password: &str) -> HostResult {
        self.session
            .change_password(old_password, new_password)
            .map_err(host_err)?;
        Ok(HostValue::Text(String::from("Password changed.")))
    }

    fn ensure_connected(&self) -> HostResult<()> {
        if self.session.is_connected() {
            Ok(())
        } else {
            Err(host_err(VenueError::NotReady))
        }
    }
}
