//! papersift - retrieval over a local library of research papers.
//!
//! Papers are split into overlapping token windows, embedded, and stored in a
//! [redb](https://github.com/cberner/redb) chunk store. Two kinds of search
//! run over that store: semantic search, which fuses the nearest chunks of
//! several queries into one ranking, and regex full-text search, which
//! rebuilds each paper's text from its chunks and returns highlighted
//! previews.
//!
//! # Quick start
//!
//! ```no_run
//! use papersift::{
//!     ChunkStore, ConfigDb, DataDir, DirectoryCatalog, Library, ModelManager,
//!     PlainTextExtractor, Settings,
//! };
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config_db = ConfigDb::open(&data_dir.config_db()).unwrap();
//! let store = ChunkStore::open(&data_dir.chunks_db()).unwrap();
//! let settings = Settings::resolve(&config_db).unwrap();
//!
//! let catalog = DirectoryCatalog::new(&config_db);
//! let mut model = ModelManager::with_model_id(settings.model.clone());
//! let mut library =
//!     Library::new(store, settings, &catalog, &PlainTextExtractor, &mut model);
//!
//! library
//!     .reindex(&["papers".to_string()], &mut |progress| eprintln!("{progress}"))
//!     .unwrap();
//!
//! let queries = vec!["sparse attention".to_string()];
//! for hit in library.semantic_search(&queries, &[], 5).unwrap() {
//!     println!("{} ({:.3})", hit.id, hit.distance);
//! }
//! ```

pub mod catalog;
pub mod chunk_store;
pub mod chunking;
pub mod config_db;
pub mod data_dir;
pub mod doc_id;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod fulltext;
pub mod indexer;
pub mod library;
pub mod model_manager;
pub mod reconstruct;
pub mod recovered;
pub mod semantic;
pub mod settings;
pub mod walker;

pub use catalog::{Catalog, DirectoryCatalog, Document};
pub use chunk_store::{ChunkHit, ChunkRecord, ChunkStore, DistanceMetric};
pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use doc_id::DocumentId;
pub use error::{Error, Result};
pub use extraction::{PlainTextExtractor, TextExtractor};
pub use library::Library;
pub use model_manager::ModelManager;
pub use settings::Settings;
