//! Batch bookkeeping.
//!
//! [`BatchTracker`] hands out batch ids and records which batches are in
//! flight. The engine disables auto-commit when the set goes from empty to
//! non-empty and restores it when the set becomes empty again, so the
//! transitions reported by [`BatchTracker::enter`] and [`BatchTracker::leave`]
//! are the only places the toggle happens.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::value::Value;

/// Batch id allocator plus the set of running batches.
#[derive(Debug, Default)]
pub struct BatchTracker {
    next_id: AtomicU64,
    running: Mutex<HashSet<u64>>,
}

impl BatchTracker {
    /// Empty tracker. Ids start at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, monotonically increasing batch id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Mark `id` as running. Returns `true` when it is the only running batch.
    pub fn enter(&self, id: u64) -> bool {
        let mut running = self.running.lock();
        let first = running.is_empty();
        let _ = running.insert(id);
        first
    }

    /// Mark `id` as finished. Returns `true` when no batch is left running.
    pub fn leave(&self, id: u64) -> bool {
        let mut running = self.running.lock();
        let _ = running.remove(&id);
        running.is_empty()
    }

    /// Whether any batch is in flight.
    pub fn has_running(&self) -> bool {
        !self.running.lock().is_empty()
    }

    /// Number of batches in flight.
    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }
}

/// Rows accumulated by a batch's fill callback.
///
/// Bind parameters for a row with [`bind`](Self::bind), then close the row
/// with [`add_batch`](Self::add_batch). [`add_row`](Self::add_row) does both.
/// Rows run in the order they were added.
#[derive(Debug, Default)]
pub struct BatchStatement {
    rows: Vec<Vec<Value>>,
    current: Vec<Value>,
}

impl BatchStatement {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bind the next parameter of the current row.
    pub fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.current.push(value.into());
        self
    }

    /// Close the current row.
    pub fn add_batch(&mut self) -> &mut Self {
        self.rows.push(std::mem::take(&mut self.current));
        self
    }

    /// Add a complete row.
    pub fn add_row<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Rows added so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no row has been added.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finished rows. A row with bound values but no `add_batch` is kept.
    pub(crate) fn into_rows(mut self) -> Vec<Vec<Value>> {
        if !self.current.is_empty() {
            self.rows.push(self.current);
        }
        self.rows
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
