//! Incremental indexing of catalog documents into the chunk store.
//!
//! A document is re-indexed only when its source file is newer than the
//! modification time stored with its chunks. Re-indexing replaces the whole
//! chunk set of the document; there are no partial updates.

use std::{collections::HashMap, fmt};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    catalog::Document,
    chunk_store::{ChunkRecord, ChunkStore},
    chunking::{self, ChunkingConfig, Tokenizer, WordTokenizer},
    embedding::{self, Embedder},
    error::Result,
    extraction::TextExtractor,
    walker,
};

/// What happened to one document during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Old chunks were replaced by a freshly embedded set.
    Indexed { deleted: usize, inserted: usize },
    /// Stored chunks are at least as new as the source file.
    Skipped,
    /// Extraction, embedding, or storage failed; stored chunks are untouched.
    Failed { reason: String },
}

/// Totals for a finished pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub total: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl IndexSummary {
    fn record(&mut self, outcome: &DocumentOutcome) {
        match outcome {
            DocumentOutcome::Indexed { .. } => self.indexed += 1,
            DocumentOutcome::Skipped => self.skipped += 1,
            DocumentOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

impl fmt::Display for IndexSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Indexed {} items ({} updated, {} up to date, {} failed)",
            self.total, self.indexed, self.skipped, self.failed
        )
    }
}

/// Progress event reported by [`Indexer::reindex`].
///
/// One `Document` event follows each document; the last event of a pass is
/// always `Complete`. Displays as `"{position}/{total}"` or as the summary
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Document {
        position: usize,
        total: usize,
        key: String,
        outcome: DocumentOutcome,
    },
    Complete(IndexSummary),
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document {
                position, total, ..
            } => write!(f, "{position}/{total}"),
            Self::Complete(summary) => summary.fmt(f),
        }
    }
}

/// Drop duplicate keys, keeping the first position of each key and the
/// last descriptor seen for it.
pub fn dedup_documents(documents: Vec<Document>) -> Vec<Document> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Document> = Vec::with_capacity(documents.len());

    for document in documents {
        match positions.get(&document.key) {
            Some(&pos) => unique[pos] = document,
            None => {
                positions.insert(document.key.clone(), unique.len());
                unique.push(document);
            }
        }
    }

    unique
}

pub struct Indexer<'a> {
    store: &'a ChunkStore,
    extractor: &'a dyn TextExtractor,
    embedder: &'a mut dyn Embedder,
    tokenizer: &'a dyn Tokenizer,
    chunking: ChunkingConfig,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a ChunkStore,
        extractor: &'a dyn TextExtractor,
        embedder: &'a mut dyn Embedder,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            embedder,
            tokenizer: &WordTokenizer,
            chunking,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: &'a dyn Tokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Bring the store up to date with `documents`.
    ///
    /// Documents are de-duplicated by key, then processed in order.
    /// `on_progress` is called after every document and once more with the
    /// final summary. A failing document is logged and counted; it never
    /// stops the pass.
    pub fn reindex(
        &mut self,
        documents: Vec<Document>,
        on_progress: &mut dyn FnMut(&Progress),
    ) -> IndexSummary {
        let documents = dedup_documents(documents);
        let total = documents.len();
        let mut summary = IndexSummary {
            total,
            ..IndexSummary::default()
        };
        info!(total, "indexing documents");

        for (i, document) in documents.into_iter().enumerate() {
            let outcome = match self.index_document(&document) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        key = %document.key,
                        path = %document.source_path.display(),
                        "failed to index document: {e}"
                    );
                    DocumentOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            summary.record(&outcome);
            on_progress(&Progress::Document {
                position: i + 1,
                total,
                key: document.key,
                outcome,
            });
        }

        info!(%summary, "indexing finished");
        on_progress(&Progress::Complete(summary));
        summary
    }

    fn index_document(&mut self, document: &Document) -> Result<DocumentOutcome> {
        let modified = walker::modification_time(&document.source_path)?;
        let existing = self.store.get_by_document_key(&document.key)?;

        if let Some(stored) = existing.first()
            && stored.modification_time >= modified
        {
            debug!(key = %document.key, "document is up to date");
            return Ok(DocumentOutcome::Skipped);
        }

        let text = self.extractor.extract_text(&document.source_path)?;
        let chunks = chunking::split(self.tokenizer, &text, self.chunking);
        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            embedding::embed_batch(self.embedder, &chunks)?
        };

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (text, embedding))| {
                ChunkRecord::new(&document.key, index, text, embedding, modified)
            })
            .collect();

        let stale: Vec<String> =
            existing.into_iter().map(|record| record.id).collect();
        let deleted = self.store.delete(&stale)?;
        self.store.insert(&records)?;

        debug!(key = %document.key, deleted, inserted = records.len(), "document indexed");
        Ok(DocumentOutcome::Indexed {
            deleted,
            inserted: records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        time::{Duration, SystemTime},
    };

    use super::*;
    use crate::{error::Error, extraction::PlainTextExtractor};

    #[derive(Default)]
    struct CountingEmbedder {
        calls: usize,
        texts: usize,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls += 1;
            self.texts += texts.len();
            if texts.iter().any(|t| t.contains("POISON")) {
                return Err(Error::upstream("embedding", "rejected batch"));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct Fixture {
        tmp: tempfile::TempDir,
        store: ChunkStore,
        embedder: CountingEmbedder,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let store = ChunkStore::open(&tmp.path().join("chunks.redb")).unwrap();
            Self {
                tmp,
                store,
                embedder: CountingEmbedder::default(),
            }
        }

        fn write(&self, name: &str, text: &str, mtime: u64) -> PathBuf {
            let path = self.tmp.path().join(name);
            std::fs::write(&path, text).unwrap();
            set_mtime(&path, mtime);
            path
        }

        fn run(&mut self, documents: Vec<Document>) -> (IndexSummary, Vec<Progress>) {
            let mut events = Vec::new();
            let chunking = ChunkingConfig::new(4, 1).unwrap();
            let mut indexer =
                Indexer::new(&self.store, &PlainTextExtractor, &mut self.embedder, chunking);
            let summary = indexer.reindex(documents, &mut |p| events.push(p.clone()));
            (summary, events)
        }

        fn ids(&self, key: &str) -> Vec<String> {
            self.store
                .get_by_document_key(key)
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect()
        }
    }

    fn set_mtime(path: &Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn doc(key: &str, path: &Path) -> Document {
        Document {
            key: key.to_string(),
            title: key.to_lowercase(),
            publication: String::new(),
            source_path: path.to_path_buf(),
        }
    }

    fn outcomes(events: &[Progress]) -> Vec<DocumentOutcome> {
        events
            .iter()
            .filter_map(|e| match e {
                Progress::Document { outcome, .. } => Some(outcome.clone()),
                Progress::Complete(_) => None,
            })
            .collect()
    }

    #[test]
    fn first_pass_indexes_all_chunks() {
        let mut fx = Fixture::new();
        let path = fx.write("d.md", "one two three four five six", 100);

        let (summary, events) = fx.run(vec![doc("D", &path)]);

        assert_eq!(fx.ids("D"), vec!["D_0", "D_1"]);
        assert_eq!(fx.embedder.calls, 1);
        assert_eq!(fx.embedder.texts, 2);
        assert_eq!(summary.indexed, 1);
        assert_eq!(
            outcomes(&events),
            vec![DocumentOutcome::Indexed {
                deleted: 0,
                inserted: 2
            }]
        );
        let chunks = fx.store.get_by_document_key("D").unwrap();
        assert!(chunks.iter().all(|c| c.modification_time == 100));
    }

    #[test]
    fn unchanged_document_is_skipped() {
        let mut fx = Fixture::new();
        let path = fx.write("d.md", "one two three four five six", 100);
        fx.run(vec![doc("D", &path)]);
        let before = fx.ids("D");

        let (summary, events) = fx.run(vec![doc("D", &path)]);

        assert_eq!(fx.ids("D"), before);
        assert_eq!(fx.embedder.calls, 1, "no embedding call on second pass");
        assert_eq!(summary.skipped, 1);
        assert_eq!(outcomes(&events), vec![DocumentOutcome::Skipped]);
    }

    #[test]
    fn newer_source_replaces_chunk_set() {
        let mut fx = Fixture::new();
        let path = fx.write("d.md", "one two three four five six", 100);
        fx.run(vec![doc("D", &path)]);

        fx.write("d.md", "one two three four five six seven eight nine ten", 150);
        let (_, events) = fx.run(vec![doc("D", &path)]);

        assert_eq!(
            outcomes(&events),
            vec![DocumentOutcome::Indexed {
                deleted: 2,
                inserted: 3
            }]
        );
        assert_eq!(fx.ids("D"), vec!["D_0", "D_1", "D_2"]);
        let chunks = fx.store.get_by_document_key("D").unwrap();
        assert!(chunks.iter().all(|c| c.modification_time == 150));
    }

    #[test]
    fn shrinking_document_leaves_no_stale_chunks() {
        let mut fx = Fixture::new();
        let path = fx.write("d.md", "one two three four five six seven eight nine ten", 100);
        fx.run(vec![doc("D", &path)]);

        fx.write("d.md", "short", 200);
        fx.run(vec![doc("D", &path)]);

        assert_eq!(fx.ids("D"), vec!["D_0"]);
    }

    #[test]
    fn older_source_than_stored_is_skipped() {
        let mut fx = Fixture::new();
        let path = fx.write("d.md", "text", 200);
        fx.run(vec![doc("D", &path)]);

        set_mtime(&path, 150);
        let (summary, _) = fx.run(vec![doc("D", &path)]);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn extraction_failure_does_not_stop_the_pass() {
        let mut fx = Fixture::new();
        let good = fx.write("good.md", "alpha beta", 100);
        let missing = fx.tmp.path().join("missing.md");

        let (summary, events) = fx.run(vec![doc("GONE", &missing), doc("OK", &good)]);

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.indexed, 1);
        assert!(matches!(outcomes(&events)[0], DocumentOutcome::Failed { .. }));
        assert_eq!(fx.ids("OK"), vec!["OK_0"]);
    }

    #[test]
    fn embedding_failure_keeps_previous_chunks() {
        let mut fx = Fixture::new();
        let path = fx.write("d.md", "good text", 100);
        fx.run(vec![doc("D", &path)]);

        fx.write("d.md", "POISON text", 150);
        let (summary, _) = fx.run(vec![doc("D", &path)]);

        assert_eq!(summary.failed, 1);
        let chunks = fx.store.get_by_document_key("D").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "good text");
        assert_eq!(chunks[0].modification_time, 100);
    }

    #[test]
    fn progress_reports_each_document_then_completion() {
        let mut fx = Fixture::new();
        let a = fx.write("a.md", "a", 100);
        let b = fx.write("b.md", "b", 100);
        let missing = fx.tmp.path().join("missing.md");

        let (_, events) = fx.run(vec![doc("A", &a), doc("X", &missing), doc("B", &b)]);
        let messages: Vec<String> = events.iter().map(|e| e.to_string()).collect();

        assert_eq!(messages.len(), 4);
        assert_eq!(&messages[..3], &["1/3", "2/3", "3/3"]);
        assert_eq!(
            messages[3],
            "Indexed 3 items (2 updated, 0 up to date, 1 failed)"
        );
        assert!(matches!(events.last(), Some(Progress::Complete(_))));
    }

    #[test]
    fn empty_batch_still_completes() {
        let mut fx = Fixture::new();
        let (summary, events) = fx.run(Vec::new());
        assert_eq!(summary, IndexSummary::default());
        assert_eq!(events, vec![Progress::Complete(IndexSummary::default())]);
    }

    #[test]
    fn empty_document_is_indexed_without_embedding() {
        let mut fx = Fixture::new();
        let path = fx.write("empty.md", "", 100);

        let (_, events) = fx.run(vec![doc("E", &path)]);

        assert_eq!(
            outcomes(&events),
            vec![DocumentOutcome::Indexed {
                deleted: 0,
                inserted: 0
            }]
        );
        assert_eq!(fx.embedder.calls, 0);
    }

    #[test]
    fn duplicate_keys_are_processed_once_with_last_descriptor() {
        let mut fx = Fixture::new();
        let first = fx.write("first.md", "first version", 100);
        let second = fx.write("second.md", "second version", 100);

        let (summary, _) = fx.run(vec![doc("D", &first), doc("D", &second)]);

        assert_eq!(summary.total, 1);
        let chunks = fx.store.get_by_document_key("D").unwrap();
        assert_eq!(chunks[0].text, "second version");
    }

    #[test]
    fn dedup_keeps_first_position() {
        let a1 = doc("A", Path::new("/a1"));
        let b = doc("B", Path::new("/b"));
        let a2 = doc("A", Path::new("/a2"));

        let unique = dedup_documents(vec![a1, b.clone(), a2.clone()]);
        assert_eq!(unique, vec![a2, b]);
    }
}
