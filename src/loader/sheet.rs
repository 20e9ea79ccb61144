use std::path::Path;

use calamine::{open_workbook_auto, Reader};

use super::{DocUnit, Extractor};
use crate::error::{KbaseError, Result};

/// Extractor for spreadsheets: one unit per sheet, rendered as a markdown
/// table with row/column counts recorded.
pub struct SheetExtractor;

impl Extractor for SheetExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        matches!(extension, "xlsx" | "xls" | "ods")
    }

    fn extract(&self, path: &Path) -> Result<Vec<DocUnit>> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| KbaseError::Extraction(format!("open workbook: {}", e)))?;

        let sheet_names = workbook.sheet_names().to_owned();
        if sheet_names.is_empty() {
            return Err(KbaseError::Extraction("workbook has no sheets".to_string()));
        }

        let mut units = Vec::new();
        for name in sheet_names {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| KbaseError::Extraction(format!("sheet {}: {}", name, e)))?;

            let (rows, cols) = range.get_size();
            let text = render_sheet_table(&name, &range);
            units.push(
                DocUnit::new(text)
                    .with_label(name.clone())
                    .with_extra(serde_json::json!({
                        "sheetName": name,
                        "rowCount": rows,
                        "columnCount": cols,
                    })),
            );
        }

        Ok(units)
    }
}

/// Render a sheet as a markdown table: sheet heading, first row as header,
/// then the data rows, with a trailing size note.
fn render_sheet_table(name: &str, range: &calamine::Range<calamine::Data>) -> String {
    let (rows, cols) = range.get_size();
    let mut out = format!("# Sheet: {}\n\n", name);

    if rows == 0 || cols == 0 {
        out.push_str("(empty sheet)\n");
        return out;
    }

    let mut row_iter = range.rows();
    if let Some(header) = row_iter.next() {
        out.push('|');
        for cell in header {
            out.push_str(&format!(" {} |", markdown_cell(&cell.to_string())));
        }
        out.push('\n');
        out.push('|');
        for _ in 0..cols {
            out.push_str(" --- |");
        }
        out.push('\n');
    }

    for row in row_iter {
        out.push('|');
        for cell in row {
            out.push_str(&format!(" {} |", markdown_cell(&cell.to_string())));
        }
        out.push('\n');
    }

    out.push_str(&format!("\n*{} rows x {} columns*\n", rows, cols));
    out
}

/// Keep cell text from breaking the table syntax
fn markdown_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::Data;
    use tempfile::TempDir;

    #[test]
    fn test_can_extract() {
        assert!(SheetExtractor.can_extract("xlsx"));
        assert!(SheetExtractor.can_extract("xls"));
        assert!(SheetExtractor.can_extract("ods"));
        assert!(!SheetExtractor.can_extract("csv"));
    }

    #[test]
    fn test_render_sheet_table() {
        let mut range = calamine::Range::new((0, 0), (2, 1));
        range.set_value((0, 0), Data::String("name".to_string()));
        range.set_value((0, 1), Data::String("count".to_string()));
        range.set_value((1, 0), Data::String("alpha".to_string()));
        range.set_value((1, 1), Data::Int(3));
        range.set_value((2, 0), Data::String("pipe|cell".to_string()));
        range.set_value((2, 1), Data::Int(7));

        let text = render_sheet_table("Inventory", &range);
        assert!(text.starts_with("# Sheet: Inventory"));
        assert!(text.contains("| name | count |"));
        assert!(text.contains("| --- | --- |"));
        assert!(text.contains("| alpha | 3 |"));
        assert!(text.contains("pipe\\|cell"));
        assert!(text.contains("*3 rows x 2 columns*"));
    }

    #[test]
    fn test_render_empty_sheet() {
        let range: calamine::Range<Data> = calamine::Range::empty();
        let text = render_sheet_table("Blank", &range);
        assert!(text.contains("(empty sheet)"));
    }

    #[test]
    fn test_unreadable_workbook_is_extraction_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.xlsx");
        std::fs::write(&path, "not a workbook").unwrap();

        let result = SheetExtractor.extract(&path);
        assert!(matches!(result, Err(KbaseError::Extraction(_))));
    }
}
