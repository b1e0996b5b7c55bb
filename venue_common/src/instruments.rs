//! Instrument identity and trading enums shared by the session core and hosts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

use crate::error::VenueError;

/// Identifying tuple for a tradable instrument/contract.
///
/// Venues that address instruments by a single id (exchange + instrument) leave
/// `commodity` empty. A contract of the form `A/B` denotes a calendar spread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Exchange code.
    pub exchange: String,
    /// Commodity/product code; empty for single-id venues.
    pub commodity: String,
    /// Contract code, or the instrument id for single-id venues.
    pub contract: String,
}

impl EntityKey {
    /// Creates a three-part key.
    pub fn new(exchange: &str, commodity: &str, contract: &str) -> Self {
        EntityKey {
            exchange: String::from(exchange),
            commodity: String::from(commodity),
            contract: String::from(contract),
        }
    }

    /// Creates a key for venues addressing instruments by a single id.
    pub fn instrument(exchange: &str, instrument: &str) -> Self {
        Self::new(exchange, "", instrument)
    }

    /// Whether the contract is a calendar spread (`A/B`).
    pub fn is_spread(&self) -> bool {
        self.contract.contains('/')
    }

    /// Splits the contract into its first and (for spreads) second leg.
    pub fn legs(&self) -> (&str, Option<&str>) {
        match self.contract.split_once('/') {
            Some((first, second)) => (first, Some(second)),
            None => (self.contract.as_str(), None),
        }
    }

    /// Text form used as cache/subscription code, e.g. `CME,ES,2412`.
    pub fn code(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.commodity.is_empty() {
            write!(f, "{},{}", self.exchange, self.contract)
        } else {
            write!(f, "{},{},{}", self.exchange, self.commodity, self.contract)
        }
    }
}

impl FromStr for EntityKey {
    type Err = VenueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(VenueError::ParseEntity(format!("empty component in '{}'", s)));
        }
        match parts.as_slice() {
            [exchange, instrument] => Ok(EntityKey::instrument(exchange, instrument)),
            [exchange, commodity, contract] => Ok(EntityKey::new(exchange, commodity, contract)),
            _ => Err(VenueError::ParseEntity(format!(
                "expected EXCHANGE,COMMODITY,CONTRACT or EXCHANGE,INSTRUMENT, got '{}'",
                s
            ))),
        }
    }
}

/// Trait providing list parsing for entity keys.
pub trait EntityParser {
    /// Parses entity keys from a buffered reader.
    ///
    /// Each non-empty line is parsed as a single `EntityKey` using `FromStr`.
    /// Returns an error if any line cannot be parsed.
    fn parse_from_reader<R: BufRead>(reader: R) -> Result<Vec<EntityKey>, VenueError>;
}

impl EntityParser for EntityKey {
    fn parse_from_reader<R: BufRead>(reader: R) -> Result<Vec<Self>, VenueError> {
        let mut keys = Vec::new();

        for line_result in reader.lines() {
            let line = line_result.map_err(VenueError::Io)?;
            let trimmed_line = line.trim();
            if trimmed_line.is_empty() || trimmed_line.starts_with('#') {
                continue;
            }
            keys.push(trimmed_line.parse::<Self>()?);
        }
        Ok(keys)
    }
}

/// Order/fill/position side.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Sign applied to quantities on this side.
    pub fn multiplier(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// Order type accepted by the command coordinator.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum OrderType {
    Market,
    Limit,
}

/// Open/cover flag of an order.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum PositionEffect {
    None,
    Open,
    Cover,
    CoverToday,
}

/// Venue order lifecycle state, displayed by its venue name (`PARTFINISHED`, ...).
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum OrderState {
    Submit,
    Accept,
    Triggering,
    ExcTriggering,
    Queued,
    PartFinished,
    Finished,
    Canceling,
    Modifying,
    Canceled,
    LeftDeleted,
    Fail,
    Deleted,
    Suppended,
    DeletedForExpire,
    Effect,
    Apply,
    #[default]
    Invalid,
}

impl OrderState {
    /// Whether the order can still trade or be cancelled.
    pub fn is_outstanding(self) -> bool {
        matches!(
            self,
            OrderState::Submit
                | OrderState::Accept
                | OrderState::Triggering
                | OrderState::ExcTriggering
                | OrderState::Queued
                | OrderState::PartFinished
                | OrderState::Canceling
                | OrderState::Modifying
                | OrderState::Suppended
                | OrderState::Effect
                | OrderState::Apply
        )
    }
}
