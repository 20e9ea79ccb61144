//! Filesystem synchronization: change detection, directory scanning, and the
//! realtime watcher. All three share the same hidden/temp-file filter so a
//! path is treated identically no matter which route discovered it.

pub mod hash;
pub mod scanner;
pub mod watcher;

pub use hash::{hash_file, needs_reprocessing};
pub use scanner::{scan_sync_root, ScanSummary};
pub use watcher::run_watcher;

use std::path::Path;

/// Suffixes of editor, backup, OS, and download artifacts that are never
/// worth indexing.
const TEMP_SUFFIXES: &[&str] = &[
    ".tmp", ".temp", ".swp", ".swo", ".swx", ".swpx", // editor temp files
    "~", ".bak", ".old", ".orig", // backup files
    ".crdownload", ".part", ".partial", ".download", // download temp files
];

/// Exact file names produced by OS indexers
const SYSTEM_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Check whether a path names a hidden file or a common temp artifact
pub fn is_hidden_or_temp(path: &Path) -> bool {
    let file_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };

    if file_name.starts_with('.') {
        return true;
    }

    if SYSTEM_FILES.contains(&file_name) {
        return true;
    }

    let lower = file_name.to_lowercase();
    TEMP_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Extension of a path, lowercased, empty when absent
pub fn path_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}
