use crate::error::{Error, Result};

/// Turns texts into dense vectors.
///
/// One call embeds one batch; the output has one vector per input text, in
/// input order.
pub trait Embedder {
    /// Embed document chunks.
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed search queries. Models with a query-side encoding override
    /// this; the rest embed queries like documents.
    fn embed_queries(&mut self, queries: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed(queries)
    }
}

/// Embed `texts` and check that the embedder returned one vector per text.
pub fn embed_batch(
    embedder: &mut dyn Embedder,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let vectors = embedder.embed(texts)?;
    check_count(texts, vectors)
}

/// Embed `queries` on the query side, with the same count check as
/// [`embed_batch`].
pub fn embed_query_batch(
    embedder: &mut dyn Embedder,
    queries: &[String],
) -> Result<Vec<Vec<f32>>> {
    let vectors = embedder.embed_queries(queries)?;
    check_count(queries, vectors)
}

fn check_count(texts: &[String], vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != texts.len() {
        return Err(Error::upstream(
            "embedding",
            format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            ),
        ));
    }
    Ok(vectors)
}
