//! Text extraction for dropped files.
//!
//! `.txt` files are decoded as strict UTF-8. `.pdf` files are extracted page
//! by page and joined with `\n` in page order. Any failure rejects the whole
//! file; there is no partial extraction.

use std::path::Path;

use crate::error::ExtractError;
use crate::models::SourceType;

/// Whether the watcher and the `ingest` command should pick up `path`.
pub fn is_supported(path: &Path) -> bool {
    SourceType::from_path(path).is_some()
}

/// Read `path` and return its full text.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let source_type = SourceType::from_path(path).ok_or_else(|| {
        ExtractError::Unsupported(
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    })?;

    let bytes = std::fs::read(path)?;
    extract_bytes(&bytes, source_type)
}

/// Extract text from an in-memory file of the given type.
pub fn extract_bytes(bytes: &[u8], source_type: SourceType) -> Result<String, ExtractError> {
    match source_type {
        SourceType::Text => Ok(String::from_utf8(bytes.to_vec())?),
        SourceType::Pdf => extract_pdf(bytes),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("PDF parser panicked".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages.join("\n"))
}
