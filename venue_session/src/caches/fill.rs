//! Fill cache: insert-if-absent per fill id, arrival order preserved.
use std::collections::HashSet;
use std::sync::Mutex;

use venue_common::Result;
use venue_common::records::FillRecord;

#[derive(Default)]
struct FillBook {
    seen: HashSet<String>,
    fills: Vec<FillRecord>,
}

/// Fills keyed by match id. A fill id is recorded once, however often it is pushed.
#[derive(Default)]
pub struct FillCache {
    book: Mutex<FillBook>,
}

impl FillCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the fill unless its id is already known. Returns whether it was new.
    pub fn insert(&self, record: FillRecord) -> Result<bool> {
        let mut book = self.book.lock()?;
        if !book.seen.insert(record.fill_id.clone()) {
            return Ok(false);
        }
        book.fills.push(record);
        Ok(true)
    }

    /// Point-in-time copy in arrival order.
    pub fn snapshot(&self) -> Result<Vec<FillRecord>> {
        let book = self.book.lock()?;
        Ok(book.fills.clone())
    }

    /// Number of distinct fills.
    pub fn count(&self) -> Result<usize> {
        Ok(self.book.lock()?.fills.len())
    }
}
