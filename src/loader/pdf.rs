use std::path::Path;

use super::{DocUnit, Extractor};
use crate::error::{KbaseError, Result};

/// Extractor for paged documents: one unit per page.
///
/// Page splitting runs through three tiers, falling back instead of hanging
/// or failing the whole file:
/// 1. per-page text extraction,
/// 2. incremental re-parse where page n is the diff of the 1..=n prefix
///    against the 1..n prefix,
/// 3. proportional splitting of the whole-document text by page count.
///
/// Whichever tier wins, the unit count equals the document's reported page
/// count.
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension == "pdf"
    }

    fn extract(&self, path: &Path) -> Result<Vec<DocUnit>> {
        let doc = lopdf::Document::load(path)
            .map_err(|e| KbaseError::Extraction(format!("pdf load: {}", e)))?;
        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(KbaseError::Extraction("pdf has no pages".to_string()));
        }

        let pages = match extract_per_page(&doc, page_count) {
            Some(pages) => pages,
            None => match extract_incremental(&doc, page_count) {
                Some(pages) => {
                    log::debug!("pdf {}: per-page extraction incomplete, used incremental diff", path.display());
                    pages
                }
                None => {
                    log::warn!(
                        "pdf {}: falling back to proportional page split",
                        path.display()
                    );
                    let whole = whole_document_text(&doc, path)?;
                    proportional_split(&whole, page_count)
                }
            },
        };

        debug_assert_eq!(pages.len(), page_count);
        Ok(pages.into_iter().map(DocUnit::new).collect())
    }
}

/// Tier 1: extract each page on its own. Empty pages are fine; only an
/// extraction error forces the next tier.
fn extract_per_page(doc: &lopdf::Document, page_count: usize) -> Option<Vec<String>> {
    let mut pages = Vec::with_capacity(page_count);
    for n in 1..=page_count {
        match doc.extract_text(&[n as u32]) {
            Ok(text) => pages.push(text.trim().to_string()),
            Err(_) => return None,
        }
    }
    Some(pages)
}

/// Tier 2: parse growing page prefixes and diff consecutive results.
fn extract_incremental(doc: &lopdf::Document, page_count: usize) -> Option<Vec<String>> {
    let mut pages = Vec::with_capacity(page_count);
    let mut previous = String::new();

    for n in 1..=page_count {
        let prefix: Vec<u32> = (1..=n as u32).collect();
        let current = doc.extract_text(&prefix).ok()?;
        if current.len() < previous.len() || !current.is_char_boundary(previous.len()) {
            return None;
        }
        pages.push(current[previous.len()..].trim().to_string());
        previous = current;
    }

    Some(pages)
}

/// Whole-document text for the proportional fallback. pdf-extract's renderer
/// handles some layouts lopdf's page text does not; lopdf is the backstop.
fn whole_document_text(doc: &lopdf::Document, path: &Path) -> Result<String> {
    match pdf_extract::extract_text(path) {
        Ok(text) => Ok(text),
        Err(e) => {
            log::debug!("pdf-extract failed for {}: {}", path.display(), e);
            let all_pages: Vec<u32> = (1..=doc.get_pages().len() as u32).collect();
            doc.extract_text(&all_pages)
                .map_err(|e| KbaseError::Extraction(format!("pdf text extraction: {}", e)))
        }
    }
}

/// Tier 3: split text into exactly `page_count` pieces of roughly equal
/// character length.
fn proportional_split(text: &str, page_count: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let per_page = chars.len().div_ceil(page_count.max(1)).max(1);

    let mut pages = Vec::with_capacity(page_count);
    for i in 0..page_count {
        let start = (i * per_page).min(chars.len());
        let end = ((i + 1) * per_page).min(chars.len());
        pages.push(chars[start..end].iter().collect::<String>().trim().to_string());
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_extract() {
        assert!(PdfExtractor.can_extract("pdf"));
        assert!(!PdfExtractor.can_extract("docx"));
    }

    #[test]
    fn test_proportional_split_always_matches_page_count() {
        for pages in 1..=7 {
            let split = proportional_split("abcdefghijklmnopqrstuvwxyz", pages);
            assert_eq!(split.len(), pages, "page count {} mismatched", pages);
        }
    }

    #[test]
    fn test_proportional_split_covers_all_text() {
        let text = "one two three four five six seven eight";
        let split = proportional_split(text, 3);
        let rejoined: String = split.join("");
        // Trimming may drop boundary whitespace, nothing else
        assert_eq!(
            rejoined.replace(' ', ""),
            text.replace(' ', "")
        );
    }

    #[test]
    fn test_proportional_split_more_pages_than_chars() {
        let split = proportional_split("ab", 5);
        assert_eq!(split.len(), 5);
        assert!(split[3].is_empty() && split[4].is_empty());
    }

    #[test]
    fn test_proportional_split_multibyte_safe() {
        let split = proportional_split("日本語のテキストです", 3);
        assert_eq!(split.len(), 3);
        assert_eq!(split.join(""), "日本語のテキストです");
    }

    #[test]
    fn test_unreadable_pdf_is_extraction_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.pdf");
        std::fs::write(&path, "%PDF-not-really").unwrap();

        let result = PdfExtractor.extract(&path);
        assert!(matches!(result, Err(KbaseError::Extraction(_))));
    }
}
