//! Persistent chunk store.
//!
//! Chunk records live in a redb database with two tables:
//!
//! - `chunks`: chunk id (`{document_key}_{index}`) → encoded record
//! - `document_chunks`: document key → chunk index (multimap)
//!
//! The multimap keeps the indices of one document sorted, so
//! [`ChunkStore::get_by_document_key`] returns chunks in index order without
//! a separate sort.
//!
//! There is no locking across calls. Each call runs in its own
//! transaction, so a reader racing a re-index of the same document can see
//! the window between [`ChunkStore::delete`] and [`ChunkStore::insert`]
//! where that document has no chunks at all.

use std::{collections::BTreeSet, fmt, path::Path, str::FromStr};

use rayon::prelude::*;
use redb::{
    Database,
    MultimapTableDefinition,
    ReadTransaction,
    ReadableDatabase,
    ReadableMultimapTable,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};
use regex::RegexBuilder;
use serde::Serialize;

use crate::error::{Error, Result};

const CHUNKS: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");
const DOCUMENT_CHUNKS: MultimapTableDefinition<&str, u64> =
    MultimapTableDefinition::new("document_chunks");

/// Header size: index, key length, text length, dimension (4 bytes each)
/// plus an 8 byte modification time.
const HEADER_SIZE: usize = 24;

/// Build the id of chunk `index` of `document_key`.
///
/// # Examples
///
/// ```
/// assert_eq!(papersift::chunk_store::chunk_id("ABCD1234", 3), "ABCD1234_3");
/// ```
pub fn chunk_id(document_key: &str, index: usize) -> String {
    format!("{document_key}_{index}")
}

/// One stored chunk of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub document_key: String,
    pub index: usize,
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    /// Source modification time in seconds since the Unix epoch. Shared by
    /// every chunk of a document.
    pub modification_time: u64,
}

impl ChunkRecord {
    pub fn new(
        document_key: &str,
        index: usize,
        text: String,
        embedding: Vec<f32>,
        modification_time: u64,
    ) -> Self {
        Self {
            id: chunk_id(document_key, index),
            document_key: document_key.to_string(),
            index,
            text,
            embedding,
            modification_time,
        }
    }

    /// Encode everything except the id, which is the table key.
    ///
    /// Binary format:
    /// - 4 bytes: chunk index (u32 LE)
    /// - 4 bytes: document key length K (u32 LE)
    /// - 4 bytes: text length L (u32 LE)
    /// - 4 bytes: embedding dimension D (u32 LE)
    /// - 8 bytes: modification time (u64 LE)
    /// - K bytes document key, L bytes text (UTF-8)
    /// - D * 4 bytes: f32 LE values
    fn encode(&self) -> Result<Vec<u8>> {
        let index = to_u32(self.index, "chunk index")?;
        let key_len = to_u32(self.document_key.len(), "document key length")?;
        let text_len = to_u32(self.text.len(), "chunk text length")?;
        let dimension = to_u32(self.embedding.len(), "embedding dimension")?;

        let mut out = Vec::with_capacity(
            HEADER_SIZE
                + self.document_key.len()
                + self.text.len()
                + std::mem::size_of_val(self.embedding.as_slice()),
        );
        out.extend_from_slice(&index.to_le_bytes());
        out.extend_from_slice(&key_len.to_le_bytes());
        out.extend_from_slice(&text_len.to_le_bytes());
        out.extend_from_slice(&dimension.to_le_bytes());
        out.extend_from_slice(&self.modification_time.to_le_bytes());
        out.extend_from_slice(self.document_key.as_bytes());
        out.extend_from_slice(self.text.as_bytes());
        out.extend_from_slice(bytemuck::cast_slice(&self.embedding));
        Ok(out)
    }

    fn decode(id: &str, bytes: &[u8]) -> Result<Self> {
        let corrupt = || Error::CorruptRecord(id.to_string());

        let index = read_u32(bytes, 0).ok_or_else(corrupt)? as usize;
        let key_len = read_u32(bytes, 4).ok_or_else(corrupt)? as usize;
        let text_len = read_u32(bytes, 8).ok_or_else(corrupt)? as usize;
        let dimension = read_u32(bytes, 12).ok_or_else(corrupt)? as usize;
        let modification_time = bytes
            .get(16..24)
            .and_then(|b| b.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or_else(corrupt)?;

        let key_end = HEADER_SIZE + key_len;
        let text_end = key_end + text_len;
        let expected_len = text_end + dimension * 4;
        if bytes.len() != expected_len {
            return Err(corrupt());
        }

        let document_key = std::str::from_utf8(&bytes[HEADER_SIZE..key_end])
            .map_err(|_| corrupt())?
            .to_string();
        let text = std::str::from_utf8(&bytes[key_end..text_end])
            .map_err(|_| corrupt())?
            .to_string();
        let embedding: Vec<f32> =
            bytemuck::pod_collect_to_vec(&bytes[text_end..]);

        Ok(Self {
            id: id.to_string(),
            document_key,
            index,
            text,
            embedding,
            modification_time,
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Config(format!("{what} {value} does not fit in u32")))
}

/// A chunk returned by a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkHit {
    pub id: String,
    pub document_key: String,
    pub index: usize,
    pub text: String,
    /// Non-negative dissimilarity; lower is more similar.
    pub distance: f32,
}

/// How [`ChunkStore::query_nearest`] measures dissimilarity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Sum of squared component differences.
    #[default]
    SquaredEuclidean,
    /// `1 - cosine similarity`, in `[0, 2]`.
    Cosine,
}

impl DistanceMetric {
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::SquaredEuclidean => {
                a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
            }
            Self::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_a = 0.0f32;
                let mut norm_b = 0.0f32;
                for (x, y) in a.iter().zip(b) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).max(0.0)
            }
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SquaredEuclidean => f.write_str("l2"),
            Self::Cosine => f.write_str("cosine"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "l2" => Ok(Self::SquaredEuclidean),
            "cosine" => Ok(Self::Cosine),
            other => Err(Error::Config(format!(
                "unknown distance metric '{other}' (expected 'l2' or 'cosine')"
            ))),
        }
    }
}

/// Chunk records of every indexed document.
pub struct ChunkStore {
    db: Database,
    metric: DistanceMetric,
}

impl ChunkStore {
    /// Open or create a chunk store at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use papersift::ChunkStore;
    ///
    /// let store = ChunkStore::open(&tmp.path().join("chunks.redb")).unwrap();
    /// assert_eq!(store.count().unwrap(), 0);
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(CHUNKS)?;
        txn.open_multimap_table(DOCUMENT_CHUNKS)?;
        txn.commit()?;

        Ok(Self {
            db,
            metric: DistanceMetric::default(),
        })
    }

    /// Use `metric` for nearest-neighbor queries.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// All chunks of a document, ordered by index. Empty when the document
    /// is not indexed.
    pub fn get_by_document_key(&self, key: &str) -> Result<Vec<ChunkRecord>> {
        let txn = self.db.begin_read()?;
        read_document(&txn, key)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<ChunkRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        let Some(guard) = table.get(id)? else {
            return Ok(None);
        };
        Ok(Some(ChunkRecord::decode(id, guard.value())?))
    }

    /// Remove chunks by id in a single transaction. Unknown ids are
    /// ignored. Returns the number of chunks removed.
    pub fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin_write()?;
        let mut removed = 0;
        {
            let mut chunks = txn.open_table(CHUNKS)?;
            let mut documents = txn.open_multimap_table(DOCUMENT_CHUNKS)?;
            for id in ids {
                let Some(record) = chunks
                    .remove(id.as_str())?
                    .map(|guard| ChunkRecord::decode(id, guard.value()))
                    .transpose()?
                else {
                    continue;
                };
                documents
                    .remove(record.document_key.as_str(), record.index as u64)?;
                removed += 1;
            }
        }
        txn.commit()?;
        Ok(removed)
    }

    /// Store records in a single transaction, replacing any with the same id.
    pub fn insert(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut chunks = txn.open_table(CHUNKS)?;
            let mut documents = txn.open_multimap_table(DOCUMENT_CHUNKS)?;
            for record in records {
                let encoded = record.encode()?;
                chunks.insert(record.id.as_str(), encoded.as_slice())?;
                documents
                    .insert(record.document_key.as_str(), record.index as u64)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove every chunk of a document. Returns the number removed.
    pub fn delete_document(&self, key: &str) -> Result<usize> {
        let ids: Vec<String> = self
            .get_by_document_key(key)?
            .into_iter()
            .map(|record| record.id)
            .collect();
        self.delete(&ids)
    }

    /// Keys of every document with at least one chunk, sorted.
    pub fn document_keys(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_multimap_table(DOCUMENT_CHUNKS)?;
        let mut keys = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }

    /// Total number of stored chunks.
    pub fn count(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        Ok(table.len()? as usize)
    }

    /// For each query embedding, the `k` closest chunks by ascending
    /// distance. Chunks at equal distance keep store order.
    ///
    /// With a `key_filter`, only chunks of those documents are considered.
    pub fn query_nearest(
        &self,
        embeddings: &[Vec<f32>],
        k: usize,
        key_filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<Vec<ChunkHit>>> {
        if embeddings.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.load(key_filter)?;
        let metric = self.metric;

        embeddings
            .iter()
            .map(|query| {
                let distances = records
                    .par_iter()
                    .map(|record| {
                        if record.embedding.len() != query.len() {
                            return Err(Error::Config(format!(
                                "query embedding has {} dimensions but chunk {} has {}",
                                query.len(),
                                record.id,
                                record.embedding.len()
                            )));
                        }
                        Ok(metric.distance(query, &record.embedding))
                    })
                    .collect::<Result<Vec<f32>>>()?;

                let mut order: Vec<usize> = (0..records.len()).collect();
                order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
                order.truncate(k);

                let hits: Vec<ChunkHit> = order
                    .into_iter()
                    .map(|i| {
                        let record = &records[i];
                        ChunkHit {
                            id: record.id.clone(),
                            document_key: record.document_key.clone(),
                            index: record.index,
                            text: record.text.clone(),
                            distance: distances[i],
                        }
                    })
                    .collect();
                Ok::<_, Error>(hits)
            })
            .collect()
    }

    /// Keys of documents with at least one chunk whose text matches the
    /// regex `pattern`.
    pub fn query_substring(
        &self,
        pattern: &str,
        case_insensitive: bool,
        key_filter: Option<&BTreeSet<String>>,
    ) -> Result<BTreeSet<String>> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(self
            .load(key_filter)?
            .into_iter()
            .filter(|record| regex.is_match(&record.text))
            .map(|record| record.document_key)
            .collect())
    }

    fn load(
        &self,
        key_filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<ChunkRecord>> {
        let txn = self.db.begin_read()?;

        if let Some(keys) = key_filter {
            let mut records = Vec::new();
            for key in keys {
                records.extend(read_document(&txn, key)?);
            }
            return Ok(records);
        }

        let table = txn.open_table(CHUNKS)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (id, value) = entry?;
            records.push(ChunkRecord::decode(id.value(), value.value())?);
        }
        Ok(records)
    }
}

fn read_document(txn: &ReadTransaction, key: &str) -> Result<Vec<ChunkRecord>> {
    let documents = txn.open_multimap_table(DOCUMENT_CHUNKS)?;
    let chunks = txn.open_table(CHUNKS)?;

    let mut records = Vec::new();
    for index in documents.get(key)? {
        let id = chunk_id(key, index?.value() as usize);
        let guard = chunks
            .get(id.as_str())?
            .ok_or_else(|| Error::CorruptRecord(id.clone()))?;
        records.push(ChunkRecord::decode(&id, guard.value())?);
    }
    Ok(records)
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("metric", &self.metric)
            .finish_non_exhaustive()
    }
}
