//! In-memory [`ChunkStore`] implementation for testing.
//!
//! Keeps the same all-or-nothing contract as the Postgres store: a batch is
//! staged in full before any of it becomes visible. A failure can be
//! injected at a given row to exercise rollback paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::ChunkRecord;

use super::ChunkStore;

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryChunkStore {
    records: RwLock<Vec<ChunkRecord>>,
    calls: AtomicUsize,
    fail_at_row: Option<usize>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose batches fail when they reach row `row` (0-based).
    pub fn failing_at(row: usize) -> Self {
        Self {
            fail_at_row: Some(row),
            ..Self::default()
        }
    }

    /// Snapshot of committed records in insertion order.
    pub fn records(&self) -> Vec<ChunkRecord> {
        self.records
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `bulk_insert` calls, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn bulk_insert(&self, records: &[ChunkRecord]) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut staged = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            if self.fail_at_row == Some(row) {
                return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                    "injected failure at row {}",
                    row
                ))));
            }
            staged.push(record.clone());
        }

        let mut committed = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        committed.extend(staged);
        Ok(())
    }
}
