//! Multi-query semantic retrieval with fusion ranking.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::{
    chunk_store::{ChunkHit, ChunkStore},
    embedding::{self, Embedder},
    error::Result,
};

/// How many results to return per requested result. Fusing several query
/// lists yields more distinct chunks than any single list, so the retriever
/// hands back up to `DEFAULT_OVERSAMPLE * n_results` hits.
pub const DEFAULT_OVERSAMPLE: usize = 2;

/// Merge per-query result lists into one list ranked by ascending distance.
///
/// A chunk present in several lists keeps its smallest distance; on equal
/// distance the first occurrence wins. Hits at equal distance stay in the
/// order they were first seen.
///
/// # Examples
///
/// ```
/// use papersift::{chunk_store::ChunkHit, semantic::fuse_results};
///
/// let hit = |id: &str, distance| ChunkHit {
///     id: id.to_string(),
///     document_key: "X".to_string(),
///     index: 0,
///     text: String::new(),
///     distance,
/// };
///
/// let fused = fuse_results(vec![vec![hit("X_0", 0.3)], vec![hit("X_0", 0.1)]]);
/// assert_eq!(fused.len(), 1);
/// assert_eq!(fused[0].distance, 0.1);
/// ```
pub fn fuse_results(per_query: Vec<Vec<ChunkHit>>) -> Vec<ChunkHit> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<ChunkHit> = Vec::new();

    for hit in per_query.into_iter().flatten() {
        match positions.get(&hit.id) {
            Some(&pos) => {
                if hit.distance < fused[pos].distance {
                    fused[pos] = hit;
                }
            }
            None => {
                positions.insert(hit.id.clone(), fused.len());
                fused.push(hit);
            }
        }
    }

    fused.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    fused
}

pub struct SemanticRetriever<'a> {
    store: &'a ChunkStore,
    embedder: &'a mut dyn Embedder,
    oversample: usize,
}

impl<'a> SemanticRetriever<'a> {
    pub fn new(store: &'a ChunkStore, embedder: &'a mut dyn Embedder) -> Self {
        Self {
            store,
            embedder,
            oversample: DEFAULT_OVERSAMPLE,
        }
    }

    pub fn with_oversample(mut self, oversample: usize) -> Self {
        self.oversample = oversample;
        self
    }

    /// Embed all `queries` in one batch, take the `n_results` nearest chunks
    /// for each, and return the fused ranking truncated to
    /// `oversample * n_results`.
    pub fn search(
        &mut self,
        queries: &[String],
        n_results: usize,
        key_filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<ChunkHit>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = embedding::embed_query_batch(self.embedder, queries)?;
        let per_query = self.store.query_nearest(&embeddings, n_results, key_filter)?;

        let mut fused = fuse_results(per_query);
        fused.truncate(self.oversample.saturating_mul(n_results));
        debug!(queries = queries.len(), hits = fused.len(), "semantic search");
        Ok(fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_store::ChunkRecord;

    /// Embeds a query as a point on the x axis given by its parsed value.
    /// Document embedding fails, so searches must take the query side.
    #[derive(Default)]
    struct AxisEmbedder {
        calls: usize,
    }

    impl Embedder for AxisEmbedder {
        fn embed(&mut self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(crate::error::Error::Model("document side used for queries".to_string()))
        }

        fn embed_queries(&mut self, queries: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls += 1;
            Ok(queries
                .iter()
                .map(|t| vec![t.parse::<f32>().unwrap_or(0.0), 0.0])
                .collect())
        }
    }

    fn hit(id: &str, distance: f32) -> ChunkHit {
        ChunkHit {
            id: id.to_string(),
            document_key: id.split('_').next().unwrap().to_string(),
            index: 0,
            text: String::new(),
            distance,
        }
    }

    /// Store with chunks `K{i}_0` at x = i for i in 0..count.
    fn line_store(tmp: &tempfile::TempDir, count: usize) -> ChunkStore {
        let store = ChunkStore::open(&tmp.path().join("chunks.redb")).unwrap();
        let records: Vec<ChunkRecord> = (0..count)
            .map(|i| {
                ChunkRecord::new(
                    &format!("K{i:02}"),
                    0,
                    format!("chunk {i}"),
                    vec![i as f32, 0.0],
                    100,
                )
            })
            .collect();
        store.insert(&records).unwrap();
        store
    }

    fn queries(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn fusion_keeps_smaller_distance() {
        let fused = fuse_results(vec![
            vec![hit("X_0", 0.3), hit("Y_0", 0.5)],
            vec![hit("X_0", 0.1)],
        ]);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].id, "X_0");
        assert_eq!(fused[0].distance, 0.1);
        assert_eq!(fused[1].id, "Y_0");
    }

    #[test]
    fn fusion_tie_keeps_first_seen() {
        let mut first = hit("X_0", 0.2);
        first.text = "first".to_string();
        let mut second = hit("X_0", 0.2);
        second.text = "second".to_string();

        let fused = fuse_results(vec![vec![first], vec![second]]);
        assert_eq!(fused[0].text, "first");
    }

    #[test]
    fn fusion_is_stable_for_equal_distances() {
        let fused = fuse_results(vec![
            vec![hit("B_0", 0.4), hit("A_0", 0.4)],
            vec![hit("C_0", 0.1)],
        ]);
        let ids: Vec<&str> = fused.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["C_0", "B_0", "A_0"]);
    }

    #[test]
    fn returns_at_most_twice_n_results() {
        let tmp = tempfile::tempdir().unwrap();
        let store = line_store(&tmp, 30);
        let mut embedder = AxisEmbedder::default();

        let hits = SemanticRetriever::new(&store, &mut embedder)
            .search(&queries(&["0", "10", "20"]), 5, None)
            .unwrap();

        assert!(hits.len() <= 10);
        assert_eq!(hits.len(), 10);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(embedder.calls, 1);
    }

    #[test]
    fn single_query_is_limited_by_store_results() {
        let tmp = tempfile::tempdir().unwrap();
        let store = line_store(&tmp, 30);
        let mut embedder = AxisEmbedder::default();

        let hits = SemanticRetriever::new(&store, &mut embedder)
            .search(&queries(&["q"]), 5, None)
            .unwrap();

        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].id, "K00_0");
    }

    #[test]
    fn oversample_is_configurable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = line_store(&tmp, 30);
        let mut embedder = AxisEmbedder::default();

        let hits = SemanticRetriever::new(&store, &mut embedder)
            .with_oversample(1)
            .search(&queries(&["0", "20"]), 4, None)
            .unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn key_filter_restricts_hits() {
        let tmp = tempfile::tempdir().unwrap();
        let store = line_store(&tmp, 10);
        let mut embedder = AxisEmbedder::default();
        let filter: BTreeSet<String> = ["K07".to_string()].into();

        let hits = SemanticRetriever::new(&store, &mut embedder)
            .search(&queries(&["0"]), 5, Some(&filter))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_key, "K07");
    }

    #[test]
    fn empty_queries_make_no_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let store = line_store(&tmp, 3);
        let mut embedder = AxisEmbedder::default();

        let hits = SemanticRetriever::new(&store, &mut embedder)
            .search(&[], 5, None)
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls, 0);
    }
}
