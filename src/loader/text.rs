use std::path::Path;

use super::{DocUnit, Extractor};
use crate::error::{KbaseError, Result};

/// Extractor for plain text, code, and markup files: one verbatim unit.
pub struct TextExtractor;

const EXTENSIONS: &[&str] = &[
    "txt", "md", "js", "ts", "py", "java", "cpp", "c", "rs", "go", "xml", "yaml", "yml", "json",
    "toml", "csv",
];

impl Extractor for TextExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        EXTENSIONS.contains(&extension)
    }

    fn extract(&self, path: &Path) -> Result<Vec<DocUnit>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KbaseError::Extraction(format!("read {}: {}", path.display(), e)))?;
        Ok(vec![DocUnit::new(content)])
    }
}
