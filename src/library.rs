//! Library-level operations over a chunk store and its collaborators.

use std::collections::BTreeSet;

use tracing::info;

use crate::{
    catalog::Catalog,
    chunk_store::{ChunkHit, ChunkStore},
    embedding::Embedder,
    error::Result,
    extraction::TextExtractor,
    fulltext::{FulltextMatch, FulltextRetriever},
    indexer::{IndexSummary, Indexer, Progress},
    reconstruct,
    semantic::SemanticRetriever,
    settings::Settings,
};

/// A searchable paper library.
///
/// Owns the chunk store and borrows the catalog, text extractor, and
/// embedder it needs to index and query.
///
/// # Examples
///
/// ```
/// # let tmp = tempfile::tempdir().unwrap();
/// use papersift::{
///     ChunkStore, ConfigDb, DirectoryCatalog, Library, PlainTextExtractor,
///     Result, Settings, embedding::Embedder,
/// };
///
/// struct Lengths;
///
/// impl Embedder for Lengths {
///     fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
///         Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
///     }
/// }
///
/// let papers = tmp.path().join("papers");
/// std::fs::create_dir(&papers).unwrap();
/// std::fs::write(papers.join("a.md"), "# A\n\nsparse attention").unwrap();
///
/// let config = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
/// config.set_collection("ml", &papers.to_string_lossy()).unwrap();
/// let store = ChunkStore::open(&tmp.path().join("chunks.redb")).unwrap();
///
/// let catalog = DirectoryCatalog::new(&config);
/// let mut embedder = Lengths;
/// let mut library = Library::new(
///     store,
///     Settings::default(),
///     &catalog,
///     &PlainTextExtractor,
///     &mut embedder,
/// );
///
/// let summary = library.reindex(&["ml".to_string()], &mut |_| {}).unwrap();
/// assert_eq!(summary.indexed, 1);
///
/// let found = library
///     .fulltext_search(&["attention".to_string()], &[], false, false)
///     .unwrap();
/// assert_eq!(found.len(), 1);
/// ```
pub struct Library<'a> {
    store: ChunkStore,
    settings: Settings,
    catalog: &'a dyn Catalog,
    extractor: &'a dyn TextExtractor,
    embedder: &'a mut dyn Embedder,
}

impl<'a> Library<'a> {
    pub fn new(
        store: ChunkStore,
        settings: Settings,
        catalog: &'a dyn Catalog,
        extractor: &'a dyn TextExtractor,
        embedder: &'a mut dyn Embedder,
    ) -> Self {
        Self {
            store: store.with_metric(settings.distance),
            settings,
            catalog,
            extractor,
            embedder,
        }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Index every document of `collection_keys`, reporting progress after
    /// each one.
    pub fn reindex(
        &mut self,
        collection_keys: &[String],
        on_progress: &mut dyn FnMut(&Progress),
    ) -> Result<IndexSummary> {
        let documents = self.catalog.list_documents(collection_keys)?;
        let mut indexer = Indexer::new(
            &self.store,
            self.extractor,
            &mut *self.embedder,
            self.settings.chunking,
        );
        Ok(indexer.reindex(documents, on_progress))
    }

    /// Nearest chunks to `queries`, limited to `collection_keys` unless the
    /// list is empty.
    pub fn semantic_search(
        &mut self,
        queries: &[String],
        collection_keys: &[String],
        n_results: usize,
    ) -> Result<Vec<ChunkHit>> {
        let filter = self.key_filter(collection_keys)?;
        SemanticRetriever::new(&self.store, &mut *self.embedder)
            .with_oversample(self.settings.oversample)
            .search(queries, n_results, filter.as_ref())
    }

    /// Documents matching every pattern in `queries`, limited to
    /// `collection_keys` unless the list is empty.
    pub fn fulltext_search(
        &self,
        queries: &[String],
        collection_keys: &[String],
        ignore_case: bool,
        bypass_index: bool,
    ) -> Result<Vec<FulltextMatch>> {
        let filter = self.key_filter(collection_keys)?;
        FulltextRetriever::new(&self.store)
            .with_options(self.settings.preview)
            .search(queries, filter.as_ref(), ignore_case, bypass_index)
    }

    pub fn reconstruct_fulltext(&self, document_key: &str) -> Result<String> {
        reconstruct::reconstruct_fulltext(&self.store, document_key)
    }

    /// Drop the chunks of every indexed document that no longer belongs to
    /// any of `collection_keys`. Returns the number of documents removed.
    pub fn prune(&self, collection_keys: &[String]) -> Result<usize> {
        let listed = self.key_filter(collection_keys)?.unwrap_or_default();
        let mut removed = 0;
        for key in self.store.document_keys()? {
            if !listed.contains(&key) {
                self.store.delete_document(&key)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "pruned documents outside the library");
        }
        Ok(removed)
    }

    fn key_filter(&self, collection_keys: &[String]) -> Result<Option<BTreeSet<String>>> {
        if collection_keys.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            self.catalog
                .list_documents(collection_keys)?
                .into_iter()
                .map(|document| document.key)
                .collect(),
        ))
    }
}
