//! Chunking utilities for splitting documents into overlapping token windows.
//!
//! Text is first split into tokens by a [`Tokenizer`], then grouped into
//! windows of `chunk_size` tokens that advance by `chunk_size - overlap`
//! tokens. Every window except possibly the last is exactly `chunk_size`
//! tokens long.
//!
//! Tokenizers must be invertible: concatenating the tokens of a text gives
//! back the text. That is what lets [`crate::reconstruct`] rebuild a
//! document from its stored chunks.

use crate::error::{Error, Result};

/// Default chunk size in tokens.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default overlap between adjacent chunks in tokens.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Window settings for [`split`].
///
/// # Examples
///
/// ```
/// use papersift::chunking::ChunkingConfig;
///
/// assert!(ChunkingConfig::new(1024, 100).is_ok());
/// assert!(ChunkingConfig::new(100, 100).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in tokens.
    pub chunk_size: usize,
    /// Tokens shared by adjacent chunks.
    pub overlap: usize,
}

impl ChunkingConfig {
    /// Validate and build a config. `overlap` must be smaller than
    /// `chunk_size`, otherwise the window would never advance.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Splits text into tokens.
///
/// Implementations must satisfy `tokenize(text).concat() == text`.
pub trait Tokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// Word-level tokenizer.
///
/// Each token is a run of non-whitespace followed by the whitespace after
/// it. Whitespace at the very start of the text is a token of its own.
///
/// # Examples
///
/// ```
/// use papersift::chunking::{Tokenizer, WordTokenizer};
///
/// let tokens = WordTokenizer.tokenize("  the cat\nsat ");
/// assert_eq!(tokens, vec!["  ", "the ", "cat\n", "sat "]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut tokens = Vec::new();
        let mut start = 0;
        let mut in_trailing_space = false;

        for (idx, c) in text.char_indices() {
            if c.is_whitespace() {
                in_trailing_space = true;
            } else if in_trailing_space {
                if idx > start {
                    tokens.push(&text[start..idx]);
                }
                start = idx;
                in_trailing_space = false;
            }
        }

        if start < text.len() {
            tokens.push(&text[start..]);
        }
        tokens
    }
}

/// Split `text` into overlapping chunks of `config.chunk_size` tokens.
///
/// Empty text produces no chunks. Text shorter than one window produces a
/// single chunk equal to the input.
///
/// # Examples
///
/// ```
/// use papersift::chunking::{split, ChunkingConfig, WordTokenizer};
///
/// let config = ChunkingConfig::new(3, 1).unwrap();
/// let chunks = split(&WordTokenizer, "a b c d e", config);
/// assert_eq!(chunks, vec!["a b c ", "c d e"]);
///
/// assert!(split(&WordTokenizer, "", config).is_empty());
/// ```
pub fn split(
    tokenizer: &dyn Tokenizer,
    text: &str,
    config: ChunkingConfig,
) -> Vec<String> {
    let tokens = tokenizer.tokenize(text);
    let total = tokens.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + config.chunk_size).min(total);
        chunks.push(tokens[start..end].concat());
        if end >= total {
            break;
        }
        start += config.step();
    }

    chunks
}
