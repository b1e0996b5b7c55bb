//! Persistence of positions and fills to an external store.
//!
//! The relational store itself is external; the core only produces upsert rows.
//! Position rows are keyed by (as-of date, account, contract) and either add to
//! or replace the stored quantity depending on the venue's position policy. Fill
//! rows are insert-or-replace by fill id.
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use serde::Serialize;
use venue_common::Result;
use venue_common::instruments::Side;
use venue_common::records::{FillRecord, PositionPolicy, PositionReport};

/// One position upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRow {
    /// Trading day the row belongs to.
    pub as_of: NaiveDate,
    /// Account the position is held in.
    pub account: String,
    /// Contract code.
    pub contract: String,
    /// Signed quantity: a delta under `Accumulate`, the net under `Replace`.
    pub quantity: i64,
    /// Additive or replace semantics.
    pub policy: PositionPolicy,
}

impl PositionRow {
    /// Row for one position report.
    pub fn from_report(as_of: NaiveDate, account: &str, report: &PositionReport) -> Self {
        PositionRow {
            as_of,
            account: String::from(account),
            contract: report.entity.code(),
            quantity: report.signed_quantity(),
            policy: report.policy,
        }
    }
}

/// One fill upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillRow {
    /// Account the fill was booked to.
    pub account: String,
    /// Order the fill belongs to.
    pub order_id: String,
    /// Natural key.
    pub fill_id: String,
    /// Contract code.
    pub contract: String,
    /// Buy or sell.
    pub side: Side,
    /// Matched quantity.
    pub quantity: u32,
    /// Match price.
    pub price: f64,
    /// Venue-formatted match time.
    pub timestamp: String,
}

impl FillRow {
    /// Row for one fill record.
    pub fn from_record(account: &str, fill: &FillRecord) -> Self {
        FillRow {
            account: String::from(account),
            order_id: fill.order_id.clone(),
            fill_id: fill.fill_id.clone(),
            contract: fill.entity.code(),
            side: fill.side,
            quantity: fill.quantity,
            price: fill.price,
            timestamp: fill.timestamp.clone(),
        }
    }
}

/// Destination of persisted rows.
pub trait PersistenceSink: Send + Sync {
    /// Upsert one position row with the row's policy semantics.
    fn upsert_position(&self, row: &PositionRow) -> Result<()>;
    /// Insert or replace one fill row by fill id.
    fn upsert_fill(&self, row: &FillRow) -> Result<()>;
}

type PositionRowKey = (NaiveDate, String, String);

/// In-memory sink applying the store's upsert semantics.
#[derive(Default)]
pub struct MemorySink {
    positions: Mutex<BTreeMap<PositionRowKey, i64>>,
    fills: Mutex<BTreeMap<String, FillRow>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored quantity for a position row key.
    pub fn position(&self, as_of: NaiveDate, account: &str, contract: &str) -> Result<Option<i64>> {
        let positions = self.positions.lock()?;
        Ok(positions
            .get(&(as_of, String::from(account), String::from(contract)))
            .copied())
    }

    /// All stored fills, ordered by fill id.
    pub fn fills(&self) -> Result<Vec<FillRow>> {
        let fills = self.fills.lock()?;
        Ok(fills.values().cloned().collect())
    }
}

impl PersistenceSink for MemorySink {
    fn upsert_position(&self, row: &PositionRow) -> Result<()> {
        let mut positions = self.positions.lock()?;
        let stored = positions
            .entry((row.as_of, row.account.clone(), row.contract.clone()))
            .or_insert(0);
        match row.policy {
            PositionPolicy::Accumulate => *stored += row.quantity,
            PositionPolicy::Replace => *stored = row.quantity,
        }
        Ok(())
    }

    fn upsert_fill(&self, row: &FillRow) -> Result<()> {
        let mut fills = self.fills.lock()?;
        fills.insert(row.fill_id.clone(), row.clone());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "table", rename_all = "lowercase")]
enum SinkLine<'a> {
    Position(&'a PositionRow),
    Fill(&'a FillRow),
}

/// Append-only JSON-lines journal, one upsert per line, for a downstream loader.
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open (or create) the journal at `path` for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(JsonLinesSink {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_line(&self, line: &SinkLine<'_>) -> Result<()> {
        let mut writer = self.writer.lock()?;
        serde_json::to_writer(&mut *writer, line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl PersistenceSink for JsonLinesSink {
    fn upsert_position(&self, row: &PositionRow) -> Result<()> {
        self.write_line(&SinkLine::Position(row))
    }

    fn upsert_fill(&self, row: &FillRow) -> Result<()> {
        self.write_line(&SinkLine::Fill(row))
    }
}
