//! Format-aware chunk splitting: recursive separator-based splitting with a
//! target size and overlap, so adjacent chunks share trailing/leading text
//! for context continuity at retrieval time.

use std::collections::VecDeque;

use crate::config::ProcessingConfig;
use crate::loader::DocUnit;

/// Splitting parameters for one format family. Sizes are in characters.
#[derive(Debug, Clone)]
pub struct SplitProfile {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<&'static str>,
}

/// One chunk of text still carrying its source unit context. The running
/// chunk index within the file is assigned by the caller.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub content: String,
    pub unit_number: usize,
    pub total_units: usize,
    pub label: Option<String>,
}

fn default_profile(config: &ProcessingConfig) -> SplitProfile {
    SplitProfile {
        chunk_size: config.chunk_size,
        chunk_overlap: config.chunk_overlap,
        separators: vec!["\n\n", "\n", " ", ""],
    }
}

/// Pick the splitting profile for a file extension.
///
/// Markdown gets larger heading-aware chunks, source code smaller
/// function/class-aware ones, line-oriented tabular text splits per line, and
/// structured data formats keep near-whole-unit chunks.
pub fn profile_for_extension(extension: &str, config: &ProcessingConfig) -> SplitProfile {
    match extension {
        "md" => SplitProfile {
            chunk_size: 1500,
            chunk_overlap: 300,
            separators: vec!["\n# ", "\n## ", "\n### ", "\n\n", "\n", " "],
        },
        "py" | "js" | "ts" | "java" | "cpp" | "c" | "rs" | "go" => SplitProfile {
            chunk_size: 800,
            chunk_overlap: 150,
            separators: vec!["\n\n", "\ndef ", "\nclass ", "\nfunction ", "\nfn ", "\n", " "],
        },
        "json" | "toml" | "yaml" | "yml" => SplitProfile {
            chunk_size: 2000,
            chunk_overlap: 100,
            separators: vec!["\n", " ", ""],
        },
        "csv" => SplitProfile {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: vec!["\n", ",", " "],
        },
        "html" | "htm" => SplitProfile {
            chunk_size: 2000,
            chunk_overlap: 300,
            separators: vec!["\n\n", "\n# ", "\n## ", "\n### ", "\n", " "],
        },
        "xlsx" | "xls" | "ods" => SplitProfile {
            chunk_size: 4000,
            chunk_overlap: 400,
            separators: vec!["\n\n", "\n", " "],
        },
        "pdf" => SplitProfile {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: vec!["\n\n", "\n", ". ", " ", ""],
        },
        _ => default_profile(config),
    }
}

/// Split loader units into chunk drafts for one file.
///
/// Paged documents that already arrive pre-split (multiple units) pass
/// through one chunk per page; everything else runs through the recursive
/// splitter with the profile for its extension.
pub fn split_units(
    units: &[DocUnit],
    extension: &str,
    config: &ProcessingConfig,
) -> Vec<ChunkDraft> {
    if extension == "pdf" && units.len() > 1 {
        return units
            .iter()
            .map(|unit| ChunkDraft {
                content: unit.text.clone(),
                unit_number: unit.unit_number,
                total_units: unit.total_units,
                label: unit.label.clone(),
            })
            .collect();
    }

    let profile = if config.use_file_type_optimization {
        profile_for_extension(extension, config)
    } else {
        default_profile(config)
    };

    let mut drafts = Vec::new();
    for unit in units {
        for piece in split_text(&unit.text, &profile) {
            drafts.push(ChunkDraft {
                content: piece,
                unit_number: unit.unit_number,
                total_units: unit.total_units,
                label: unit.label.clone(),
            });
        }
    }
    drafts
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_on_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(|c| c.to_string()).collect();
    }
    text.split(separator)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Split text recursively: try each separator in order, splitting oversized
/// pieces with the remaining separators, then merge small pieces back into
/// chunks of at most `chunk_size` characters with `chunk_overlap` of shared
/// trailing text.
pub fn split_text(text: &str, profile: &SplitProfile) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    split_recursive(text, &profile.separators, profile)
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn split_recursive(text: &str, separators: &[&str], profile: &SplitProfile) -> Vec<String> {
    let (sep_index, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
        .map(|(i, sep)| (i, *sep))
        .unwrap_or((separators.len().saturating_sub(1), *separators.last().unwrap_or(&"")));
    let remaining = &separators[(sep_index + 1).min(separators.len())..];

    let splits = split_on_separator(text, separator);

    let mut chunks = Vec::new();
    let mut good: Vec<String> = Vec::new();

    for piece in splits {
        if char_len(&piece) < profile.chunk_size {
            good.push(piece);
            continue;
        }
        if !good.is_empty() {
            chunks.extend(merge_splits(&good, separator, profile));
            good.clear();
        }
        if remaining.is_empty() {
            // No finer separator left; an oversized piece survives whole
            chunks.push(piece);
        } else {
            chunks.extend(split_recursive(&piece, remaining, profile));
        }
    }

    if !good.is_empty() {
        chunks.extend(merge_splits(&good, separator, profile));
    }
    chunks
}

/// Merge small splits into chunks, retaining a trailing window of splits at
/// each chunk boundary to produce the overlap.
fn merge_splits(splits: &[String], separator: &str, profile: &SplitProfile) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut current: VecDeque<String> = VecDeque::new();
    let mut total = 0usize;

    for piece in splits {
        let piece_len = char_len(piece);
        let join_len = if current.is_empty() { 0 } else { sep_len };

        if total + piece_len + join_len > profile.chunk_size && !current.is_empty() {
            let chunk = current.iter().cloned().collect::<Vec<_>>().join(separator);
            if !chunk.trim().is_empty() {
                chunks.push(chunk);
            }
            while total > profile.chunk_overlap
                || (total + piece_len + if current.is_empty() { 0 } else { sep_len }
                    > profile.chunk_size
                    && total > 0)
            {
                let first = match current.pop_front() {
                    Some(first) => first,
                    None => break,
                };
                total -= char_len(&first) + if current.is_empty() { 0 } else { sep_len };
            }
        }

        total += piece_len + if current.is_empty() { 0 } else { sep_len };
        current.push_back(piece.clone());
    }

    let chunk = current.iter().cloned().collect::<Vec<_>>().join(separator);
    if !chunk.trim().is_empty() {
        chunks.push(chunk);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProcessingConfig {
        ProcessingConfig::default()
    }

    fn md_profile() -> SplitProfile {
        profile_for_extension("md", &config())
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(split_text("", &md_profile()).is_empty());
        assert!(split_text("   \n  ", &md_profile()).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = split_text("Just a short note.", &md_profile());
        assert_eq!(chunks, vec!["Just a short note."]);
    }

    #[test]
    fn test_chunks_respect_target_size() {
        let words: Vec<String> = (0..500).map(|i| format!("word{}", i)).collect();
        let text = words.join(" ");
        let profile = SplitProfile {
            chunk_size: 200,
            chunk_overlap: 40,
            separators: vec!["\n\n", "\n", " ", ""],
        };

        let chunks = split_text(&text, &profile);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(
                chunk.chars().count() <= profile.chunk_size,
                "chunk too large: {} chars",
                chunk.chars().count()
            );
        }
    }

    #[test]
    fn test_adjacent_chunks_share_overlapping_text() {
        let words: Vec<String> = (0..500).map(|i| format!("word{}", i)).collect();
        let text = words.join(" ");
        let profile = SplitProfile {
            chunk_size: 200,
            chunk_overlap: 40,
            separators: vec![" "],
        };

        let chunks = split_text(&text, &profile);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split_whitespace().last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "no overlap between '{}...' and '{}...'",
                &pair[0][..30.min(pair[0].len())],
                &pair[1][..30.min(pair[1].len())]
            );
        }
    }

    #[test]
    fn test_markdown_example_two_headings_three_paragraphs() {
        let text = "# First\n\nA paragraph of text under the first heading.\n\n\
                    Another paragraph with a bit more detail in it.\n\n\
                    ## Second\n\nThe closing paragraph lives here.";
        let chunks = split_text(text, &md_profile());
        assert!(!chunks.is_empty());
        let all = chunks.join("\n");
        assert!(all.contains("First"));
        assert!(all.contains("closing paragraph"));
    }

    #[test]
    fn test_csv_profile_splits_per_line() {
        let profile = profile_for_extension("csv", &config());
        // Each line is short; the 500-char budget still groups whole lines
        let text = (0..100)
            .map(|i| format!("row{},{},{}", i, i * 2, i * 3))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_text(&text, &profile);
        assert!(chunks.len() > 1);
        // No chunk splits a line in half: every chunk starts at a row start
        for chunk in &chunks {
            assert!(chunk.starts_with("row"), "chunk starts mid-line: {}", chunk);
        }
    }

    #[test]
    fn test_prepaged_pdf_units_pass_through() {
        let units: Vec<DocUnit> = (0..4)
            .map(|i| {
                let mut unit = DocUnit::new(format!("page {} text", i + 1));
                unit.unit_number = i + 1;
                unit.total_units = 4;
                unit
            })
            .collect();

        let drafts = split_units(&units, "pdf", &config());
        assert_eq!(drafts.len(), 4);
        assert_eq!(drafts[2].unit_number, 3);
        assert_eq!(drafts[2].content, "page 3 text");
    }

    #[test]
    fn test_single_page_pdf_is_split_normally() {
        let mut unit = DocUnit::new("sentence. ".repeat(400));
        unit.unit_number = 1;
        unit.total_units = 1;

        let drafts = split_units(&[unit], "pdf", &config());
        assert!(drafts.len() > 1);
        assert!(drafts.iter().all(|d| d.unit_number == 1));
    }

    #[test]
    fn test_unit_context_carried_into_drafts() {
        let mut unit = DocUnit::new("cell data ".repeat(10)).with_label("Sheet1");
        unit.unit_number = 2;
        unit.total_units = 3;

        let drafts = split_units(&[unit], "xlsx", &config());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].label.as_deref(), Some("Sheet1"));
        assert_eq!(drafts[0].unit_number, 2);
        assert_eq!(drafts[0].total_units, 3);
    }

    #[test]
    fn test_oversized_single_token_survives() {
        let profile = SplitProfile {
            chunk_size: 10,
            chunk_overlap: 2,
            separators: vec![" "],
        };
        let chunks = split_text("supercalifragilisticexpialidocious", &profile);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_profile_selection() {
        let cfg = config();
        assert_eq!(profile_for_extension("md", &cfg).chunk_size, 1500);
        assert_eq!(profile_for_extension("rs", &cfg).chunk_size, 800);
        assert_eq!(profile_for_extension("csv", &cfg).chunk_size, 500);
        assert_eq!(profile_for_extension("txt", &cfg).chunk_size, cfg.chunk_size);
    }
}
