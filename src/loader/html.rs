use std::path::Path;

use scraper::{Html, Selector};

use super::{DocUnit, Extractor};
use crate::error::{KbaseError, Result};

/// Extractor for hypertext: the document body is converted to a lightweight
/// markdown-like text form (headings, lists, emphasis, and tables survive
/// structurally), with the title taken from the document head when present.
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension == "html" || extension == "htm"
    }

    fn extract(&self, path: &Path) -> Result<Vec<DocUnit>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KbaseError::Extraction(format!("read {}: {}", path.display(), e)))?;

        let document = Html::parse_document(&content);

        let title = Selector::parse("title")
            .ok()
            .and_then(|selector| document.select(&selector).next())
            .map(|elem| elem.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let text = html2text::from_read(content.as_bytes(), 100)
            .map_err(|e| KbaseError::Extraction(format!("html convert: {}", e)))?;

        let rendered = match &title {
            Some(title) => format!("# {}\n\n{}", title, text),
            None => text,
        };

        let extra = match title {
            Some(title) => serde_json::json!({ "title": title }),
            None => serde_json::Value::Null,
        };

        Ok(vec![DocUnit::new(rendered.trim().to_string()).with_extra(extra)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_can_extract() {
        let extractor = HtmlExtractor;
        assert!(extractor.can_extract("html"));
        assert!(extractor.can_extract("htm"));
        assert!(!extractor.can_extract("md"));
    }

    #[test]
    fn test_title_and_structure_preserved() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("page.html");
        fs::write(
            &path,
            r#"<html><head><title>My Page</title></head>
               <body><h1>Heading</h1><p>Some paragraph.</p>
               <ul><li>first</li><li>second</li></ul></body></html>"#,
        )
        .unwrap();

        let units = HtmlExtractor.extract(&path).unwrap();
        assert_eq!(units.len(), 1);
        let text = &units[0].text;
        assert!(text.starts_with("# My Page"));
        assert!(text.contains("Heading"));
        assert!(text.contains("Some paragraph."));
        assert!(text.contains("first"));
        assert_eq!(units[0].extra["title"], serde_json::json!("My Page"));
    }

    #[test]
    fn test_untitled_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bare.html");
        fs::write(&path, "<p>just text</p>").unwrap();

        let units = HtmlExtractor.extract(&path).unwrap();
        assert!(units[0].text.contains("just text"));
        assert!(units[0].extra.is_null());
    }
}
