//! Core data models used throughout the ingester.
//!
//! These types represent the chunks and records that flow through the
//! extract → chunk → embed → store pipeline.

use std::path::Path;

use serde::Serialize;

/// One token window of a document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Kind of source file, stored in the `source_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Text,
}

impl SourceType {
    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceType::Pdf),
            "txt" => Some(SourceType::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Text => "text",
        }
    }
}

/// A persisted row: one chunk plus its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub source_type: SourceType,
    /// File name of the source document.
    pub source_id: String,
    /// Full path of the source document as seen by the watcher.
    pub path: String,
    pub language: Option<String>,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    /// JSON object carrying at least `index`.
    pub metadata: serde_json::Value,
}

/// Result of processing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Chunks were embedded and written.
    Ingested { chunks: usize },
    /// Extracted text was empty or whitespace; nothing to do.
    Empty,
    /// Dry run: extracted and chunked only.
    Previewed { chunks: usize },
}

impl IngestOutcome {
    pub fn chunks(&self) -> usize {
        match self {
            IngestOutcome::Ingested { chunks } | IngestOutcome::Previewed { chunks } => *chunks,
            IngestOutcome::Empty => 0,
        }
    }
}
