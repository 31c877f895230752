//! Postgres + pgvector chunk store.
//!
//! Records are written with one transaction per [`bulk_insert`] call, so a
//! file's rows are committed together or not at all. Embeddings are bound
//! as native `vector` values and metadata as `jsonb`.
//!
//! # Connection Pool
//!
//! The pool is created lazily on the first write and shared by every
//! processing task holding the same `Arc<PgChunkStore>`. Concurrent first
//! writers race on a [`OnceCell`]; exactly one of them connects and the rest
//! wait for it. [`PgChunkStore::close`] tears the pool down at shutdown.
//!
//! # Schema
//!
//! The table is managed outside this crate and must provide:
//!
//! ```sql
//! CREATE TABLE rag_chunks (
//!     id          BIGSERIAL PRIMARY KEY,
//!     source_type TEXT NOT NULL,
//!     source_id   TEXT NOT NULL,
//!     path        TEXT NOT NULL,
//!     language    TEXT,
//!     chunk       TEXT NOT NULL,
//!     embedding   VECTOR(1024) NOT NULL,
//!     metadata    JSONB NOT NULL DEFAULT '{}'
//! );
//! ```
//!
//! [`bulk_insert`]: ChunkStore::bulk_insert

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tokio::sync::OnceCell;

use crate::config::DbConfig;
use crate::error::StoreError;
use crate::models::ChunkRecord;

use super::ChunkStore;

/// Pooled writer for the chunk table.
pub struct PgChunkStore {
    url: String,
    max_connections: u32,
    acquire_timeout: Duration,
    insert_sql: String,
    pool: OnceCell<PgPool>,
}

impl PgChunkStore {
    /// Create a store handle. Does not connect.
    pub fn new(url: impl Into<String>, config: &DbConfig) -> Result<Self, StoreError> {
        validate_table_name(&config.table)?;

        Ok(Self {
            url: url.into(),
            max_connections: config.max_connections,
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
            insert_sql: insert_sql(&config.table),
            pool: OnceCell::new(),
        })
    }

    /// The shared pool, connecting on first use.
    pub async fn pool(&self) -> Result<&PgPool, StoreError> {
        self.pool
            .get_or_try_init(|| async {
                tracing::info!(
                    max_connections = self.max_connections,
                    "connecting to vector store"
                );
                PgPoolOptions::new()
                    .max_connections(self.max_connections)
                    .acquire_timeout(self.acquire_timeout)
                    .connect(&self.url)
                    .await
                    .map_err(StoreError::Pool)
            })
            .await
    }

    /// Whether the pool has been created.
    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }

    /// Close the pool if it was ever opened.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            tracing::info!("vector store pool closed");
        }
    }
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn bulk_insert(&self, records: &[ChunkRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        for (row, record) in records.iter().enumerate() {
            let result = sqlx::query(&self.insert_sql)
                .bind(record.source_type.as_str())
                .bind(&record.source_id)
                .bind(&record.path)
                .bind(&record.language)
                .bind(&record.chunk_text)
                .bind(Vector::from(record.embedding.clone()))
                .bind(Json(record.metadata.clone()))
                .execute(&mut *tx)
                .await;

            if let Err(e) = result {
                tracing::debug!(row, error = %e, "insert failed, rolling back batch");
                return Err(abort_batch(tx.rollback(), row, e).await);
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Roll back a failed batch. The caller always sees the insert error; a
/// rollback failure is only logged.
async fn abort_batch<F>(rollback: F, row: usize, cause: sqlx::Error) -> StoreError
where
    F: Future<Output = Result<(), sqlx::Error>>,
{
    if let Err(e) = rollback.await {
        tracing::warn!(row, error = %e, "rollback failed");
    }
    StoreError::Database(cause)
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} (source_type, source_id, path, language, chunk, embedding, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
        table
    )
}

/// Accept `table` or `schema.table` made of plain SQL identifiers.
pub fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let parts: Vec<&str> = name.split('.').collect();
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(name.to_string()))
    }
}
