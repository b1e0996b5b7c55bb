//! Position cache with per-key update policy.
//!
//! Venues report positions either as individual lots (accumulate the signed
//! quantity) or as net summaries (replace). The first report for a key pins that
//! key's policy; a later report under the other policy is refused rather than
//! folded in, since mixing the two corrupts the net quantity.
use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use venue_common::instruments::EntityKey;
use venue_common::records::{PositionPolicy, PositionReport};
use venue_common::{Result, VenueError};

/// Net position of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionAggregate {
    /// Exchange/commodity/contract.
    pub entity: EntityKey,
    /// Policy pinned by the first report.
    pub policy: PositionPolicy,
    /// Signed net quantity.
    pub net_quantity: i64,
}

/// Positions keyed by entity.
#[derive(Default)]
pub struct PositionCache {
    positions: Mutex<BTreeMap<EntityKey, PositionAggregate>>,
}

impl PositionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one report into its aggregate and return the new net quantity.
    pub fn apply(&self, report: &PositionReport) -> Result<i64> {
        let mut positions = self.positions.lock()?;
        let aggregate = positions
            .entry(report.entity.clone())
            .or_insert_with(|| PositionAggregate {
                entity: report.entity.clone(),
                policy: report.policy,
                net_quantity: 0,
            });

        if aggregate.policy != report.policy {
            return Err(VenueError::PositionPolicyMismatch {
                key: report.entity.code(),
                pinned: aggregate.policy.to_string(),
                requested: report.policy.to_string(),
            });
        }

        match aggregate.policy {
            PositionPolicy::Accumulate => aggregate.net_quantity += report.signed_quantity(),
            PositionPolicy::Replace => aggregate.net_quantity = report.signed_quantity(),
        }
        Ok(aggregate.net_quantity)
    }

    /// Net quantity for one entity.
    pub fn net_quantity(&self, entity: &EntityKey) -> Result<Option<i64>> {
        let positions = self.positions.lock()?;
        Ok(positions.get(entity).map(|p| p.net_quantity))
    }

    /// Point-in-time copy, ordered by entity.
    pub fn snapshot(&self) -> Result<Vec<PositionAggregate>> {
        let positions = self.positions.lock()?;
        Ok(positions.values().cloned().collect())
    }
}
