use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::error::Result;

/// A source file found under a collection directory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the collection root directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
}

/// File extensions treated as documents.
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Recursively walk a directory and collect document files, sorted by
/// relative path.
///
/// Hidden files and directories (names starting with `.`) are skipped.
pub fn discover_files(root: &Path) -> Result<Vec<SourceFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<SourceFile>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk_dir(root, &path, results)?;
            continue;
        }

        // Follow symlinks to files only; linked directories could cycle.
        let Ok(resolved) = path.canonicalize() else {
            continue;
        };
        if resolved.is_file() && is_supported(&resolved) {
            results.push(SourceFile {
                relative_path: path.strip_prefix(root).unwrap_or(&path).to_path_buf(),
                absolute_path: resolved,
            });
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

/// Last modification time of `path` in seconds since the Unix epoch.
pub fn modification_time(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?
        .modified()?
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs())
}
