//! Token-window text chunker.
//!
//! Splits document text into overlapping windows measured in tokens of the
//! same BPE vocabulary the embedding service budgets on (`cl100k_base`).
//! Window `i` covers tokens `[i * stride, i * stride + window)` where
//! `stride = window - overlap`, so adjacent chunks share exactly `overlap`
//! tokens and the last window is clipped to the end of the document.
//!
//! Windows are cut on token boundaries, not character boundaries. A
//! character split between two windows decodes as U+FFFD on each side;
//! no window is ever dropped.
//!
//! Chunking is pure and deterministic: the same text and parameters always
//! produce the same chunks.

use std::ops::Range;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::ConfigError;
use crate::models::Chunk;

/// Encodes text into token ids and back.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode a token slice. Never fails: bytes of a character split by a
    /// window boundary decode as U+FFFD, so every token yields output.
    fn decode(&self, tokens: &[u32]) -> String;
}

/// The `cl100k_base` BPE shared with the embedding service.
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let bytes: Vec<u8> = self
            .bpe
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Splits text into overlapping token windows.
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    window: usize,
    overlap: usize,
}

impl Chunker {
    /// Requires `window > 0` and `overlap < window`.
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        window: usize,
        overlap: usize,
    ) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError("chunk window must be > 0 tokens".to_string()));
        }
        if overlap >= window {
            return Err(ConfigError(format!(
                "chunk overlap ({}) must be smaller than the window ({})",
                overlap, window
            )));
        }
        Ok(Self {
            tokenizer,
            window,
            overlap,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into chunks with contiguous indices starting at 0.
    /// Empty text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let tokens = self.tokenizer.encode(text);

        window_bounds(tokens.len(), self.window, self.overlap)
            .into_iter()
            .enumerate()
            .map(|(index, range)| Chunk {
                index,
                text: self.tokenizer.decode(&tokens[range]),
            })
            .collect()
    }
}

/// Token ranges covered by each window of a `total`-token document.
///
/// Starts at 0 and advances by `window - overlap` until the start reaches
/// `total`. Callers must ensure `window > overlap`.
pub fn window_bounds(total: usize, window: usize, overlap: usize) -> Vec<Range<usize>> {
    debug_assert!(window > overlap);
    let stride = window - overlap;
    let mut bounds = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + window).min(total);
        bounds.push(start..end);
        start += stride;
    }

    bounds
}
