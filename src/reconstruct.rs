//! Rebuild a document's text from its stored overlapping chunks.

use crate::{chunk_store::ChunkStore, error::Result};

/// Concatenate chunks, dropping the overlap between each neighbouring pair.
///
/// The overlap is the longest run of characters that ends the text built so
/// far and starts the next chunk. It is found from the text itself, so the
/// result does not depend on the tokenizer or overlap setting used when the
/// chunks were made.
///
/// # Examples
///
/// ```
/// use papersift::reconstruct::merge_overlapping;
///
/// let text = merge_overlapping(&["...the cat sat on", " sat on the mat..."]);
/// assert_eq!(text, "...the cat sat on the mat...");
/// ```
pub fn merge_overlapping<S: AsRef<str>>(chunks: &[S]) -> String {
    let Some((first, rest)) = chunks.split_first() else {
        return String::new();
    };

    let mut text = first.as_ref().to_string();
    for chunk in rest {
        let chunk = chunk.as_ref();
        let overlap = chunk
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .rev()
            .find(|&end| text.ends_with(&chunk[..end]))
            .unwrap_or(0);
        text.push_str(&chunk[overlap..]);
    }
    text
}

/// Full text of `document_key` as stored in `store`; empty when the
/// document has no chunks.
pub fn reconstruct_fulltext(store: &ChunkStore, document_key: &str) -> Result<String> {
    let chunks: Vec<String> = store
        .get_by_document_key(document_key)?
        .into_iter()
        .map(|record| record.text)
        .collect();
    Ok(merge_overlapping(&chunks))
}
