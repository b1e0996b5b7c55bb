//! Reference caches mirrored from the venue.
//!
//! Sweep query responses and live pushes both land here through the same
//! `apply_*` methods, so a record is treated identically whichever path delivered
//! it. Each cache guards itself with its own mutex. When a persistence sink is
//! attached, every new fill and every position report is forwarded as an upsert
//! row; sink failures are reported on the alert channel and never reach the
//! gateway thread that delivered the event.
pub mod fill;
pub mod fund;
pub mod order;
pub mod position;

use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, error};
use venue_common::records::{FillRecord, FundSnapshot, OrderRecord, PositionReport};

use crate::alerts::{AlertSource, Notifier};
use crate::sink::{FillRow, PersistenceSink, PositionRow};

pub use fill::FillCache;
pub use fund::FundCache;
pub use order::OrderCache;
pub use position::{PositionAggregate, PositionCache};

struct Persistence {
    sink: Arc<dyn PersistenceSink>,
    account: String,
    as_of: NaiveDate,
}

/// The four reference caches of one session.
pub struct ReferenceCaches {
    /// Orders by order id.
    pub orders: OrderCache,
    /// Fills by fill id.
    pub fills: FillCache,
    /// Positions by entity.
    pub positions: PositionCache,
    /// Account funds.
    pub funds: FundCache,
    notifier: Notifier,
    persistence: Option<Persistence>,
}

impl ReferenceCaches {
    /// Empty caches reporting failures through `notifier`.
    pub fn new(notifier: Notifier) -> Self {
        ReferenceCaches {
            orders: OrderCache::new(),
            fills: FillCache::new(),
            positions: PositionCache::new(),
            funds: FundCache::new(),
            notifier,
            persistence: None,
        }
    }

    /// Forward fills and position reports to `sink` under `account` for `as_of`.
    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>, account: &str, as_of: NaiveDate) -> Self {
        self.persistence = Some(Persistence {
            sink,
            account: String::from(account),
            as_of,
        });
        self
    }

    /// Upsert one order.
    pub fn apply_order(&self, record: OrderRecord) {
        let order_id = record.order_id.clone();
        match self.orders.upsert(record) {
            Ok(()) => debug!("Order {} upserted", order_id),
            Err(e) => error!("Failed to upsert order {}: {}", order_id, e),
        }
    }

    /// Insert one fill unless already known. Returns whether it was new.
    pub fn apply_fill(&self, record: FillRecord) -> bool {
        let row = self
            .persistence
            .as_ref()
            .map(|p| FillRow::from_record(&p.account, &record));
        let fill_id = record.fill_id.clone();
        match self.fills.insert(record) {
            Ok(true) => {
                debug!("Fill {} recorded", fill_id);
                if let (Some(p), Some(row)) = (&self.persistence, row) {
                    if let Err(e) = p.sink.upsert_fill(&row) {
                        self.notifier
                            .alert(AlertSource::Persistence, format!("Failed to persist fill {}: {}", fill_id, e));
                    }
                }
                true
            }
            Ok(false) => {
                debug!("Duplicate fill {} ignored", fill_id);
                false
            }
            Err(e) => {
                error!("Failed to record fill {}: {}", fill_id, e);
                false
            }
        }
    }

    /// Fold one position report into its aggregate.
    pub fn apply_position(&self, report: PositionReport) {
        match self.positions.apply(&report) {
            Ok(net) => {
                debug!("Position {} now {}", report.entity, net);
                if let Some(p) = &self.persistence {
                    let row = PositionRow::from_report(p.as_of, &p.account, &report);
                    if let Err(e) = p.sink.upsert_position(&row) {
                        self.notifier.alert(
                            AlertSource::Persistence,
                            format!("Failed to persist position {}: {}", report.entity, e),
                        );
                    }
                }
            }
            Err(e) => error!("Position report for {} dropped: {}", report.entity, e),
        }
    }

    /// Replace the fund snapshot.
    pub fn apply_fund(&self, snapshot: FundSnapshot) {
        if let Err(e) = self.funds.replace(snapshot) {
            error!("Failed to replace fund snapshot: {}", e);
        }
    }
}
