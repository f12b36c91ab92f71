use std::path::Path;

use crate::error::Result;

/// Turns a source file into plain text.
pub trait TextExtractor {
    fn extract_text(&self, source_path: &Path) -> Result<String>;
}

/// Reads UTF-8 text files as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, source_path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(source_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_file_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("paper.md");
        std::fs::write(&path, "# Title\n\nBody").unwrap();
        assert_eq!(PlainTextExtractor.extract_text(&path).unwrap(), "# Title\n\nBody");
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(PlainTextExtractor.extract_text(&tmp.path().join("nope.md")).is_err());
    }
}
