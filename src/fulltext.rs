//! Regex full-text search over reconstructed documents.
//!
//! Search runs in two phases. The first narrows the candidate set with the
//! store's chunk-level match on the first query term. The second rebuilds
//! each candidate's text and requires every term to match somewhere in it,
//! collecting highlighted previews along the way. A term that spans a chunk
//! boundary is only found in the second phase, which is why `bypass_index`
//! exists.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    chunk_store::ChunkStore,
    error::{Error, Result},
    reconstruct,
};

pub const DEFAULT_PREVIEW_LENGTH: usize = 50;
pub const DEFAULT_PREVIEW_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewOptions {
    /// Characters of context on each side of a match.
    pub length: usize,
    /// Previews kept per document and query term.
    pub limit: usize,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            length: DEFAULT_PREVIEW_LENGTH,
            limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FulltextMatch {
    pub document_key: String,
    /// HTML-safe snippets with the match wrapped in `<mark>`.
    pub previews: Vec<String>,
}

pub struct FulltextRetriever<'a> {
    store: &'a ChunkStore,
    options: PreviewOptions,
}

impl<'a> FulltextRetriever<'a> {
    pub fn new(store: &'a ChunkStore) -> Self {
        Self {
            store,
            options: PreviewOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PreviewOptions) -> Self {
        self.options = options;
        self
    }

    /// Documents in which every pattern of `queries` matches.
    ///
    /// Candidates come from the chunk index unless `bypass_index` is set,
    /// in which case every key of `key_filter` (or every indexed document
    /// when there is no filter) is checked. Results follow the lexical
    /// order of document keys.
    pub fn search(
        &self,
        queries: &[String],
        key_filter: Option<&BTreeSet<String>>,
        ignore_case: bool,
        bypass_index: bool,
    ) -> Result<Vec<FulltextMatch>> {
        let Some(first) = queries.first() else {
            return Ok(Vec::new());
        };
        let patterns = queries
            .iter()
            .map(|q| compile(q, ignore_case))
            .collect::<Result<Vec<Regex>>>()?;

        let candidates = if bypass_index {
            match key_filter {
                Some(keys) => keys.clone(),
                None => self.store.document_keys()?.into_iter().collect(),
            }
        } else {
            self.store.query_substring(first, ignore_case, key_filter)?
        };
        debug!(candidates = candidates.len(), "fulltext candidates");

        let mut matches = Vec::new();
        for key in candidates {
            let text = match reconstruct::reconstruct_fulltext(self.store, &key) {
                Ok(text) => text,
                Err(e) => {
                    warn!(key = %key, "skipping document that could not be reconstructed: {e}");
                    continue;
                }
            };
            if let Some(previews) = self.previews(&text, &patterns) {
                matches.push(FulltextMatch {
                    document_key: key,
                    previews,
                });
            }
        }
        Ok(matches)
    }

    /// Previews for every pattern in order, or `None` as soon as one
    /// pattern has no match. The preview limit only caps how many
    /// windows are built per pattern.
    fn previews(&self, text: &str, patterns: &[Regex]) -> Option<Vec<String>> {
        let mut previews = Vec::new();
        for pattern in patterns {
            if !pattern.is_match(text) {
                return None;
            }
            previews.extend(
                pattern
                    .find_iter(text)
                    .take(self.options.limit)
                    .map(|m| preview(text, m.start(), m.end(), self.options.length)),
            );
        }
        Some(previews)
    }
}

fn compile(pattern: &str, ignore_case: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Snippet of `text` around the match at `start..end` with `context`
/// characters on each side.
fn preview(text: &str, start: usize, end: usize, context: usize) -> String {
    let from = chars_before(text, start, context);
    let to = chars_after(text, end, context);
    format!(
        "{}<mark>{}</mark>{}",
        html_escape::encode_text(&text[from..start]),
        html_escape::encode_text(&text[start..end]),
        html_escape::encode_text(&text[end..to]),
    )
}

/// Byte offset `n` characters before `at`, clamped to the start.
fn chars_before(text: &str, at: usize, n: usize) -> usize {
    if n == 0 {
        return at;
    }
    text[..at]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map_or(0, |(i, _)| i)
}

/// Byte offset `n` characters after `at`, clamped to the end.
fn chars_after(text: &str, at: usize, n: usize) -> usize {
    text[at..]
        .char_indices()
        .nth(n)
        .map_or(text.len(), |(i, _)| at + i)
}
