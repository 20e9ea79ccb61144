//! Document loading: one extractor per format family, selected through a
//! registry keyed on file extension. Supportedness is decided from the
//! extension table alone, before any I/O happens.

pub mod docx;
pub mod html;
pub mod pdf;
pub mod sheet;
pub mod slides;
pub mod text;

use std::path::Path;

use crate::error::{KbaseError, Result};
use crate::sync::path_extension;

/// One page/section unit produced by an extractor.
///
/// `unit_number` and `total_units` are assigned by the registry after
/// extraction so every extractor only has to return units in order.
#[derive(Debug, Clone)]
pub struct DocUnit {
    pub text: String,
    /// 1-based page/slide/sheet number
    pub unit_number: usize,
    pub total_units: usize,
    /// Sheet or slide label when the format has one
    pub label: Option<String>,
    /// Format-specific detail (paragraph count, row/column counts, title)
    pub extra: serde_json::Value,
}

impl DocUnit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            unit_number: 1,
            total_units: 1,
            label: None,
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }
}

/// Result of loading one document. Extraction failures are carried as an
/// error string with zero units instead of unwinding, so one bad file can
/// never take down a batch.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub units: Vec<DocUnit>,
    pub metadata: LoadMetadata,
}

#[derive(Debug, Clone)]
pub struct LoadMetadata {
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub page_count: usize,
    pub error: Option<String>,
}

impl LoadResult {
    pub fn is_success(&self) -> bool {
        self.metadata.error.is_none() && !self.units.is_empty()
    }
}

/// Extension to MIME type table. Doubles as the supported-format list.
const SUPPORTED_EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("js", "application/javascript"),
    ("ts", "application/typescript"),
    ("py", "text/x-python"),
    ("java", "text/x-java-source"),
    ("cpp", "text/x-c++src"),
    ("c", "text/x-csrc"),
    ("rs", "text/x-rust"),
    ("go", "text/x-go"),
    ("xml", "application/xml"),
    ("yaml", "text/yaml"),
    ("yml", "text/yaml"),
    ("json", "application/json"),
    ("toml", "application/toml"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("xls", "application/vnd.ms-excel"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pdf", "application/pdf"),
];

/// MIME type for an extension, None when the extension is unsupported
pub fn mime_type(extension: &str) -> Option<&'static str> {
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// Check supportedness from the extension alone
pub fn is_supported(path: &Path) -> bool {
    mime_type(&path_extension(path)).is_some()
}

/// Trait for document extractors
pub trait Extractor: Send + Sync {
    /// Check if this extractor handles the given file extension
    fn can_extract(&self, extension: &str) -> bool;

    /// Extract ordered page/section units from a file
    fn extract(&self, path: &Path) -> Result<Vec<DocUnit>>;
}

/// Extractor registry that selects the implementation by extension
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create a registry with all built-in extractors
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: Vec::new(),
        };

        registry.register(Box::new(text::TextExtractor));
        registry.register(Box::new(html::HtmlExtractor));
        registry.register(Box::new(docx::DocxExtractor));
        registry.register(Box::new(sheet::SheetExtractor));
        registry.register(Box::new(slides::SlidesExtractor));
        registry.register(Box::new(pdf::PdfExtractor));

        registry
    }

    /// Register an extractor. Adding a format is additive: implement the
    /// trait and register it here.
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    /// Find the extractor handling an extension
    pub fn find_extractor(&self, extension: &str) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.can_extract(extension))
            .map(|e| e.as_ref())
    }

    /// Load a document, producing units with per-unit numbering.
    ///
    /// Unsupported extensions error out before any I/O. Everything after
    /// the extension check is captured into the result object.
    pub fn load_document(&self, path: &Path) -> Result<LoadResult> {
        let extension = path_extension(path);
        let mime = mime_type(&extension)
            .ok_or_else(|| KbaseError::UnsupportedFileType(format!(".{}", extension)))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        let mut metadata = LoadMetadata {
            file_path: path.to_string_lossy().to_string(),
            file_name,
            file_size: 0,
            mime_type: mime.to_string(),
            page_count: 0,
            error: None,
        };

        let size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) => {
                metadata.error = Some(e.to_string());
                return Ok(LoadResult {
                    units: Vec::new(),
                    metadata,
                });
            }
        };
        metadata.file_size = size;

        let extractor = match self.find_extractor(&extension) {
            Some(e) => e,
            None => {
                // Supported extension without a registered extractor
                metadata.error = Some(format!("No extractor registered for .{}", extension));
                return Ok(LoadResult {
                    units: Vec::new(),
                    metadata,
                });
            }
        };

        match extractor.extract(path) {
            Ok(mut units) => {
                let total = units.len();
                for (idx, unit) in units.iter_mut().enumerate() {
                    unit.unit_number = idx + 1;
                    unit.total_units = total;
                }
                metadata.page_count = total;
                if total == 0 {
                    metadata.error = Some("Document produced no text units".to_string());
                }
                Ok(LoadResult { units, metadata })
            }
            Err(e) => {
                log::warn!("Extraction failed for {}: {}", path.display(), e);
                metadata.error = Some(e.to_string());
                Ok(LoadResult {
                    units: Vec::new(),
                    metadata,
                })
            }
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
