use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::db::files::format_modified;
use crate::error::Result;

/// Compute the SHA-256 hash of a file's contents, streamed.
///
/// Reads through a fixed buffer so large files are never held in memory.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Decide whether a known file needs reprocessing from its modification time.
///
/// This is the cheap pre-filter: hashing only happens once the mtime check
/// already warrants an update. A missing stored mtime counts as changed.
pub fn needs_reprocessing(
    stored_modified_at: Option<&str>,
    fs_modified: std::time::SystemTime,
) -> bool {
    let current = match format_modified(fs_modified) {
        Some(ts) => ts,
        None => return true,
    };
    match stored_modified_at {
        Some(stored) => stored != current,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hash_file_known_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.txt");
        fs::write(&path, "test content").unwrap();

        let hash = hash_file(&path).unwrap();
        // sha256("test content")
        assert_eq!(
            hash,
            "6ae8a75555209fd6c44157c0aed8016e763ff435a19cf186f76863140143ff72"
        );
    }

    #[test]
    fn test_hash_file_streams_large_input() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.bin");
        // Larger than the read buffer so multiple passes happen
        fs::write(&path, vec![0xABu8; 64 * 1024]).unwrap();

        let hash = hash_file(&path).unwrap();
        assert_eq!(hash.len(), 64);

        // Same content at another path hashes identically
        let path2 = temp_dir.path().join("big2.bin");
        fs::write(&path2, vec![0xABu8; 64 * 1024]).unwrap();
        assert_eq!(hash, hash_file(&path2).unwrap());
    }

    #[test]
    fn test_needs_reprocessing_mtime_match() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.txt");
        fs::write(&path, "content").unwrap();
        let mtime = fs::metadata(&path).unwrap().modified().unwrap();

        let stored = format_modified(mtime).unwrap();
        assert!(!needs_reprocessing(Some(&stored), mtime));
        assert!(needs_reprocessing(Some("2020-01-01T00:00:00+00:00"), mtime));
        assert!(needs_reprocessing(None, mtime));
    }
}
