use std::path::Path;

/// Length of a document key in hex characters.
pub const KEY_LEN: usize = 16;

/// A stable document key derived from a source file's absolute path.
///
/// The same file reached through two collections gets the same key, so the
/// indexer sees it once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId {
    /// Upper-case hex prefix of the BLAKE3 hash of the path.
    pub key: String,
}

impl DocumentId {
    pub fn for_path(path: &Path) -> Self {
        let hash = blake3::hash(path.to_string_lossy().as_bytes());
        let key = hash.to_hex()[..KEY_LEN].to_ascii_uppercase();
        Self { key }
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = DocumentId::for_path(Path::new("/papers/attention.md"));
        let b = DocumentId::for_path(Path::new("/papers/attention.md"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_paths_differ() {
        let a = DocumentId::for_path(Path::new("/papers/attention.md"));
        let b = DocumentId::for_path(Path::new("/papers/resnet.md"));
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_upper_hex() {
        let id = DocumentId::for_path(Path::new("/papers/attention.md"));
        assert_eq!(id.key.len(), KEY_LEN);
        assert!(
            id.key
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
        assert_eq!(id.to_string(), id.key);
    }
}
