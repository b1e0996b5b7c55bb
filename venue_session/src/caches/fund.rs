//! Fund cache: a single snapshot replaced wholesale.
use std::sync::Mutex;

use venue_common::Result;
use venue_common::records::FundSnapshot;

/// Latest account funds; zeros until the first update.
#[derive(Default)]
pub struct FundCache {
    snapshot: Mutex<FundSnapshot>,
}

impl FundCache {
    /// Create a cache holding zeros.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot.
    pub fn replace(&self, snapshot: FundSnapshot) -> Result<()> {
        *self.snapshot.lock()? = snapshot;
        Ok(())
    }

    /// Copy of the stored snapshot.
    pub fn snapshot(&self) -> Result<FundSnapshot> {
        Ok(*self.snapshot.lock()?)
    }
}
