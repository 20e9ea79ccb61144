use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{DocUnit, Extractor};
use crate::error::{KbaseError, Result};

/// Extractor for OOXML word-processing documents: a single unit of extracted
/// raw text with the paragraph count recorded.
pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension == "docx"
    }

    fn extract(&self, path: &Path) -> Result<Vec<DocUnit>> {
        let file = File::open(path)
            .map_err(|e| KbaseError::Extraction(format!("open {}: {}", path.display(), e)))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| KbaseError::Extraction(format!("not an OOXML container: {}", e)))?;

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| KbaseError::Extraction(format!("word/document.xml missing: {}", e)))?
            .read_to_string(&mut xml)
            .map_err(|e| KbaseError::Extraction(e.to_string()))?;

        let paragraphs = extract_paragraphs(&xml)?;
        let paragraph_count = paragraphs.len();
        let text = paragraphs.join("\n");

        Ok(vec![DocUnit::new(text)
            .with_extra(serde_json::json!({ "paragraphCount": paragraph_count }))])
    }
}

/// Walk the document XML collecting the text runs of each `w:p` paragraph.
fn extract_paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);

    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_text_run {
                    let decoded = t
                        .decode()
                        .map_err(|e| KbaseError::Parse(format!("docx text run: {}", e)))?;
                    let text = quick_xml::escape::unescape(&decoded)
                        .map_err(|e| KbaseError::Parse(format!("docx text run: {}", e)))?;
                    current.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => {
                    let paragraph = current.trim();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(KbaseError::Extraction(format!("document.xml parse: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}
