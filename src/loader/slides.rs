use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{DocUnit, Extractor};
use crate::error::{KbaseError, Result};

/// Extractor for slide decks: one unit per slide, text runs joined per
/// paragraph. Slides with no extractable text still produce a placeholder
/// unit so slide numbering survives. The legacy binary `.ppt` format yields a
/// single advisory unit.
pub struct SlidesExtractor;

impl Extractor for SlidesExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension == "pptx" || extension == "ppt"
    }

    fn extract(&self, path: &Path) -> Result<Vec<DocUnit>> {
        let extension = crate::sync::path_extension(path);
        if extension == "ppt" {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("presentation");
            return Ok(vec![DocUnit::new(format!(
                "{} is in the legacy binary PowerPoint format. \
                 Re-save it as .pptx to index its slide text.",
                name
            ))
            .with_extra(serde_json::json!({ "legacyFormat": true }))]);
        }

        let file = File::open(path)
            .map_err(|e| KbaseError::Extraction(format!("open {}: {}", path.display(), e)))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| KbaseError::Extraction(format!("not an OOXML container: {}", e)))?;

        // Slide parts are ppt/slides/slideN.xml; order by N, not archive order
        let mut slide_names: Vec<(usize, String)> = archive
            .file_names()
            .filter_map(|name| {
                let number = name
                    .strip_prefix("ppt/slides/slide")?
                    .strip_suffix(".xml")?
                    .parse::<usize>()
                    .ok()?;
                Some((number, name.to_string()))
            })
            .collect();
        slide_names.sort_by_key(|(number, _)| *number);

        if slide_names.is_empty() {
            return Err(KbaseError::Extraction(
                "presentation contains no slides".to_string(),
            ));
        }

        let mut units = Vec::new();
        for (number, name) in slide_names {
            let mut xml = String::new();
            archive
                .by_name(&name)
                .map_err(|e| KbaseError::Extraction(format!("{}: {}", name, e)))?
                .read_to_string(&mut xml)
                .map_err(|e| KbaseError::Extraction(e.to_string()))?;

            let text = extract_slide_text(&xml)?;
            let text = if text.trim().is_empty() {
                format!("(Slide {} contains no extractable text)", number)
            } else {
                text
            };
            units.push(
                DocUnit::new(text)
                    .with_label(format!("Slide {}", number))
                    .with_extra(serde_json::json!({ "slideNumber": number })),
            );
        }

        Ok(units)
    }
}

/// Collect `a:t` text runs, joined per `a:p` paragraph.
fn extract_slide_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);

    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"a:t" {
                    in_text_run = true;
                }
            }
            Ok(Event::Text(t)) => {
                if in_text_run {
                    let decoded = t
                        .decode()
                        .map_err(|e| KbaseError::Parse(format!("slide text run: {}", e)))?;
                    let text = quick_xml::escape::unescape(&decoded)
                        .map_err(|e| KbaseError::Parse(format!("slide text run: {}", e)))?;
                    current.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"a:t" => in_text_run = false,
                b"a:p" => {
                    let paragraph = current.trim();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(KbaseError::Extraction(format!("slide xml parse: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}
