//! Error types for the ingestion pipeline.
//!
//! Adapter-level errors ([`ExtractError`], [`AuthError`], [`EmbedError`],
//! [`StoreError`]) describe a single failed operation and know nothing about
//! the file being processed. [`IngestError`] wraps them with the file path so
//! every failure that reaches the logs can be traced back to its source.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Text extraction failure. The file is left un-ingested.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("unsupported file extension: {0}")]
    Unsupported(String),
}

/// Token endpoint failure.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("token response missing access_token: {body}")]
    MissingToken { body: String },
}

/// Embedding endpoint failure, including a response that does not line up
/// with the request.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("embedding endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("embedding response malformed ({reason}): {body}")]
    Malformed { reason: String, body: String },

    #[error("embedding response has {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

/// Bulk insert failure. The transaction has been rolled back.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database pool unavailable: {0}")]
    Pool(#[source] sqlx::Error),

    #[error("database write failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid table name: {0:?}")]
    InvalidTable(String),
}

/// Per-file processing failure. Always names the file.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("extraction failed for {path}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("authentication failed for {path}: {source}")]
    Authentication {
        path: PathBuf,
        #[source]
        source: AuthError,
    },

    #[error("embedding failed for {path}: {source}")]
    EmbeddingRequest {
        path: PathBuf,
        #[source]
        source: EmbedError,
    },

    #[error("storage failed for {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("processing task for {path} did not complete: {reason}")]
    Task { path: PathBuf, reason: String },
}

impl IngestError {
    /// The file this error belongs to.
    pub fn path(&self) -> &PathBuf {
        match self {
            IngestError::Extraction { path, .. }
            | IngestError::Authentication { path, .. }
            | IngestError::EmbeddingRequest { path, .. }
            | IngestError::Storage { path, .. }
            | IngestError::Task { path, .. } => path,
        }
    }
}

/// Directory watcher setup failure.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watch directory not found: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to watch directory: {0}")]
    Notify(#[from] notify::Error),

    #[error("invalid exclude glob: {0}")]
    Glob(#[from] globset::Error),
}

/// Invalid configuration value.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ConfigError(pub String);
