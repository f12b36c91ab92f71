//! Document catalog.
//!
//! The indexer only needs [`Catalog::list_documents`]. The bundled
//! [`DirectoryCatalog`] treats each registered collection as a directory
//! whose `.md` and `.txt` files are the documents.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    config_db::ConfigDb,
    doc_id::DocumentId,
    error::{Error, Result},
    walker,
};

/// A document as described by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub key: String,
    pub title: String,
    pub publication: String,
    pub source_path: PathBuf,
}

pub trait Catalog {
    /// Documents of the given collections, in collection order. A document
    /// filed under several collections may appear more than once.
    fn list_documents(&self, collection_keys: &[String]) -> Result<Vec<Document>>;
}

/// Catalog backed by the collections registered in [`ConfigDb`].
#[derive(Debug, Clone, Copy)]
pub struct DirectoryCatalog<'a> {
    config_db: &'a ConfigDb,
}

impl<'a> DirectoryCatalog<'a> {
    pub fn new(config_db: &'a ConfigDb) -> Self {
        Self { config_db }
    }

    /// Number of documents in a collection, without reading any of them.
    pub fn count_documents(&self, name: &str) -> Result<usize> {
        let root = self.collection_root(name)?;
        Ok(walker::discover_files(&root)?.len())
    }

    fn collection_root(&self, name: &str) -> Result<PathBuf> {
        self.config_db
            .get_collection(name)?
            .map(PathBuf::from)
            .ok_or_else(|| Error::NotFound {
                kind: "collection",
                name: name.to_string(),
            })
    }
}

impl Catalog for DirectoryCatalog<'_> {
    fn list_documents(&self, collection_keys: &[String]) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        for name in collection_keys {
            let root = self.collection_root(name)?;

            for file in walker::discover_files(&root)? {
                let title = extract_title(&file.absolute_path);
                documents.push(Document {
                    key: DocumentId::for_path(&file.absolute_path).key,
                    title,
                    // Plain files carry no venue metadata.
                    publication: String::new(),
                    source_path: file.absolute_path,
                });
            }
        }

        Ok(documents)
    }
}

/// First markdown heading of the file, falling back to the file stem.
/// Reading stops at the heading.
fn extract_title(path: &Path) -> String {
    if let Ok(file) = File::open(path) {
        let heading = BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .find_map(|line| {
                let title = line.trim().strip_prefix("# ")?.trim();
                (!title.is_empty()).then(|| title.to_string())
            });
        if let Some(title) = heading {
            return title;
        }
    }

    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn lists_documents_of_registered_collections() {
        let (tmp, db) = setup();
        let papers = tmp.path().join("papers");
        std::fs::create_dir(&papers).unwrap();
        std::fs::write(papers.join("attention.md"), "# Attention Is All You Need\n\nbody").unwrap();
        std::fs::write(papers.join("notes.txt"), "no heading").unwrap();
        db.set_collection("ml", &papers.to_string_lossy()).unwrap();

        let docs = DirectoryCatalog::new(&db)
            .list_documents(&["ml".to_string()])
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "Attention Is All You Need");
        assert_eq!(docs[1].title, "notes");
        assert!(docs.iter().all(|d| d.source_path.is_absolute()));
    }

    #[test]
    fn overlapping_collections_share_keys() {
        let (tmp, db) = setup();
        let papers = tmp.path().join("papers");
        std::fs::create_dir(&papers).unwrap();
        std::fs::write(papers.join("a.md"), "a").unwrap();
        db.set_collection("one", &papers.to_string_lossy()).unwrap();
        db.set_collection("two", &papers.to_string_lossy()).unwrap();

        let docs = DirectoryCatalog::new(&db)
            .list_documents(&["one".to_string(), "two".to_string()])
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].key, docs[1].key);
    }

    #[test]
    fn title_is_the_first_heading_only() {
        let (tmp, _db) = setup();
        let path = tmp.path().join("paper.md");
        std::fs::write(&path, "preamble\n#\n# Sparse Attention\n\n# Appendix\n").unwrap();
        assert_eq!(extract_title(&path), "Sparse Attention");

        let missing = tmp.path().join("missing-paper.md");
        assert_eq!(extract_title(&missing), "missing-paper");
    }

    #[test]
    fn counts_documents_per_collection() {
        let (tmp, db) = setup();
        let papers = tmp.path().join("papers");
        std::fs::create_dir_all(papers.join("nested")).unwrap();
        std::fs::write(papers.join("a.md"), "a").unwrap();
        std::fs::write(papers.join("nested/b.txt"), "b").unwrap();
        std::fs::write(papers.join("figure.png"), "not a paper").unwrap();
        db.set_collection("ml", &papers.to_string_lossy()).unwrap();

        let catalog = DirectoryCatalog::new(&db);
        assert_eq!(catalog.count_documents("ml").unwrap(), 2);
        assert!(matches!(
            catalog.count_documents("ghost"),
            Err(Error::NotFound { kind: "collection", .. })
        ));
    }

    #[test]
    fn unknown_collection_is_not_found() {
        let (_tmp, db) = setup();
        let err = DirectoryCatalog::new(&db)
            .list_documents(&["ghost".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "collection", .. }));
    }
}
