//! Storage abstraction for chunk records.
//!
//! The [`ChunkStore`] trait is the only write path the file processor
//! needs: append one file's records atomically. Two backends exist:
//!
//! - [`postgres::PgChunkStore`]: pgvector-backed production store.
//! - [`memory::MemoryChunkStore`]: in-process store for tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::ChunkRecord;

pub use memory::MemoryChunkStore;
pub use postgres::PgChunkStore;

/// Append-only, transactional record sink.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert every record or none of them.
    async fn bulk_insert(&self, records: &[ChunkRecord]) -> Result<(), StoreError>;
}
