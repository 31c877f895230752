//! Per-file ingestion.
//!
//! A file moves through the stages below strictly in order; the first
//! failure aborts the rest and nothing is written:
//!
//! ```text
//! Extracted → Chunked → TokenObtained → Embedded → Persisted → Done
//!     │
//!     └── empty/whitespace text ──────────────────────────────→ Done (no-op)
//! ```
//!
//! Errors are returned as [`IngestError`] and always name the file. Logging
//! them is the dispatcher's job.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::Instrument;
use uuid::Uuid;

use crate::chunk::Chunker;
use crate::embedding::EmbeddingService;
use crate::error::{EmbedError, ExtractError, IngestError};
use crate::extract;
use crate::models::{Chunk, ChunkRecord, IngestOutcome, SourceType};
use crate::store::ChunkStore;

/// Something the dispatcher can hand a file path to.
#[async_trait]
pub trait ProcessFile: Send + Sync {
    async fn process(&self, path: &Path) -> Result<IngestOutcome, IngestError>;
}

/// Processing stage, used in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extracted,
    Chunked,
    TokenObtained,
    Embedded,
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extracted => "extracted",
            Stage::Chunked => "chunked",
            Stage::TokenObtained => "token_obtained",
            Stage::Embedded => "embedded",
            Stage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// Extract → chunk → embed → store for one file at a time.
pub struct FileProcessor {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn ChunkStore>,
}

impl FileProcessor {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// Ingest one file.
    pub async fn ingest(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        let ingest_id = Uuid::new_v4();
        let span = tracing::info_span!("ingest", file = %path.display(), %ingest_id);
        self.run(path, ingest_id).instrument(span).await
    }

    async fn run(&self, path: &Path, ingest_id: Uuid) -> Result<IngestOutcome, IngestError> {
        let (source_type, text) = extract_text(path).await?;
        tracing::debug!(stage = %Stage::Extracted, bytes = text.len());

        if text.trim().is_empty() {
            tracing::warn!("empty file, nothing to ingest");
            return Ok(IngestOutcome::Empty);
        }

        let chunks = self.chunker.chunk(&text);
        tracing::debug!(stage = %Stage::Chunked, chunks = chunks.len());
        let token = self
            .embedder
            .authenticate()
            .await
            .map_err(|source| IngestError::Authentication {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(stage = %Stage::TokenObtained);

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts, &token)
            .await
            .map_err(|source| IngestError::EmbeddingRequest {
                path: path.to_path_buf(),
                source,
            })?;
        if vectors.len() != chunks.len() {
            return Err(IngestError::EmbeddingRequest {
                path: path.to_path_buf(),
                source: EmbedError::CountMismatch {
                    expected: chunks.len(),
                    actual: vectors.len(),
                },
            });
        }
        tracing::debug!(stage = %Stage::Embedded, vectors = vectors.len());

        let document = SourceDocument {
            path,
            source_type,
            content_sha256: format!("{:x}", Sha256::digest(text.as_bytes())),
            ingest_id,
        };
        let records = build_records(&document, &chunks, vectors);

        self.store
            .bulk_insert(&records)
            .await
            .map_err(|source| IngestError::Storage {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(stage = %Stage::Persisted, rows = records.len());

        tracing::info!(chunks = records.len(), "ingested");
        Ok(IngestOutcome::Ingested {
            chunks: records.len(),
        })
    }
}

#[async_trait]
impl ProcessFile for FileProcessor {
    async fn process(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        self.ingest(path).await
    }
}

/// Dry-run processor: extracts and chunks, touches neither network nor store.
pub struct PreviewProcessor {
    chunker: Chunker,
}

impl PreviewProcessor {
    pub fn new(chunker: Chunker) -> Self {
        Self { chunker }
    }
}

#[async_trait]
impl ProcessFile for PreviewProcessor {
    async fn process(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        let (_, text) = extract_text(path).await?;
        if text.trim().is_empty() {
            return Ok(IngestOutcome::Empty);
        }
        let chunks = self.chunker.chunk(&text).len();
        tracing::info!(file = %path.display(), chunks, "previewed");
        Ok(IngestOutcome::Previewed { chunks })
    }
}

struct SourceDocument<'a> {
    path: &'a Path,
    source_type: SourceType,
    content_sha256: String,
    ingest_id: Uuid,
}

fn build_records(
    document: &SourceDocument<'_>,
    chunks: &[Chunk],
    vectors: Vec<Vec<f32>>,
) -> Vec<ChunkRecord> {
    let source_id = document
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = document.path.to_string_lossy().into_owned();
    let total = chunks.len();

    chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, embedding)| ChunkRecord {
            source_type: document.source_type,
            source_id: source_id.clone(),
            path: path.clone(),
            language: None,
            chunk_text: chunk.text.clone(),
            embedding,
            metadata: serde_json::json!({
                "index": chunk.index,
                "total_chunks": total,
                "content_sha256": document.content_sha256,
                "ingest_id": document.ingest_id.to_string(),
            }),
        })
        .collect()
}

/// Extract on the blocking pool; PDF parsing is CPU-bound.
async fn extract_text(path: &Path) -> Result<(SourceType, String), IngestError> {
    let source_type = SourceType::from_path(path).ok_or_else(|| IngestError::Extraction {
        path: path.to_path_buf(),
        source: ExtractError::Unsupported(
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ),
    })?;

    let owned: PathBuf = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || extract::extract_file(&owned))
        .await
        .map_err(|e| IngestError::Task {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .map_err(|source| IngestError::Extraction {
            path: path.to_path_buf(),
            source,
        })?;

    Ok((source_type, text))
}
