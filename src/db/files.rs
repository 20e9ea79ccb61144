use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use rusqlite::{params, Row};

use crate::db::Db;
use crate::error::{KbaseError, Result};

/// Per-file processing status, stored as an integer column.
///
/// The pipeline walks PENDING through COMPLETED in order; FAILED and
/// EMBEDDING_FAILED are the two terminal failure states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Parsing,
    Parsed,
    Chunking,
    Chunked,
    Embedding,
    Completed,
    Failed,
    EmbeddingFailed,
}

impl FileStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            FileStatus::Pending => 0,
            FileStatus::Parsing => 1,
            FileStatus::Parsed => 2,
            FileStatus::Chunking => 3,
            FileStatus::Chunked => 4,
            FileStatus::Embedding => 5,
            FileStatus::Completed => 6,
            FileStatus::Failed => -1,
            FileStatus::EmbeddingFailed => -2,
        }
    }

    pub fn from_i64(code: i64) -> Result<Self> {
        Ok(match code {
            0 => FileStatus::Pending,
            1 => FileStatus::Parsing,
            2 => FileStatus::Parsed,
            3 => FileStatus::Chunking,
            4 => FileStatus::Chunked,
            5 => FileStatus::Embedding,
            6 => FileStatus::Completed,
            -1 => FileStatus::Failed,
            -2 => FileStatus::EmbeddingFailed,
            other => {
                return Err(KbaseError::Parse(format!(
                    "Unknown file status code: {}",
                    other
                )))
            }
        })
    }

    pub fn is_failed(self) -> bool {
        matches!(self, FileStatus::Failed | FileStatus::EmbeddingFailed)
    }
}

/// One tracked file
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub size: u64,
    pub hash: String,
    pub modified_at: Option<String>,
    pub status: FileStatus,
    pub sync_root_id: i64,
    pub kb_id: i64,
    pub mime_type: Option<String>,
    pub content_length: Option<i64>,
    pub last_processed: Option<String>,
    pub error_message: Option<String>,
}

/// Insert payload for a newly discovered file
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub hash: String,
    pub modified_at: Option<String>,
    pub sync_root_id: i64,
    pub kb_id: i64,
}

/// Stored identity of a known path, used by the scanner's change detection
#[derive(Debug, Clone)]
pub struct StoredFileMeta {
    pub id: i64,
    pub hash: String,
    pub modified_at: Option<String>,
}

const FILE_COLUMNS: &str = "id, name, path, size, hash, modified_at, status, sync_root_id, kb_id, \
     mime_type, content_length, last_processed, error_message";

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let status_code: i64 = row.get(6)?;
    Ok(FileRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
        hash: row.get(4)?,
        modified_at: row.get(5)?,
        status: FileStatus::from_i64(status_code).unwrap_or(FileStatus::Pending),
        sync_root_id: row.get(7)?,
        kb_id: row.get(8)?,
        mime_type: row.get(9)?,
        content_length: row.get(10)?,
        last_processed: row.get(11)?,
        error_message: row.get(12)?,
    })
}

/// Format a filesystem modification time as RFC 3339 for storage
pub fn format_modified(modified: std::time::SystemTime) -> Option<String> {
    let duration = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Utc.timestamp_opt(duration.as_secs() as i64, duration.subsec_nanos())
        .single()
        .map(|dt| dt.to_rfc3339())
}

/// Insert a new file record with status PENDING. Returns the row id.
pub async fn create_file(db: &Db, file: NewFile) -> Result<i64> {
    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO files (name, path, size, hash, modified_at, status, sync_root_id, kb_id)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                file.name,
                file.path,
                file.size as i64,
                file.hash,
                file.modified_at,
                file.sync_root_id,
                file.kb_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
    .await
}

/// Fetch a file record by id
pub async fn get_file(db: &Db, file_id: i64) -> Result<Option<FileRecord>> {
    db.with_connection(move |conn| {
        let sql = format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![file_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row_to_file(row)?));
        }
        Ok(None)
    })
    .await
}

/// Look up a file record by its (path, sync root) identity
pub async fn find_by_path(db: &Db, path: &str, sync_root_id: i64) -> Result<Option<FileRecord>> {
    let path = path.to_string();
    db.with_connection(move |conn| {
        let sql = format!(
            "SELECT {} FROM files WHERE path = ?1 AND sync_root_id = ?2",
            FILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![path, sync_root_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row_to_file(row)?));
        }
        Ok(None)
    })
    .await
}

/// Check whether any file anywhere in the store already carries this content hash
pub async fn hash_exists(db: &Db, hash: &str) -> Result<bool> {
    let hash = hash.to_string();
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare("SELECT 1 FROM files WHERE hash = ?1 LIMIT 1")?;
        Ok(stmt.exists(params![hash])?)
    })
    .await
}

/// Load the known paths of a sync root as a map for the scanner's reconcile pass
pub async fn known_paths(db: &Db, sync_root_id: i64) -> Result<HashMap<String, StoredFileMeta>> {
    db.with_connection(move |conn| {
        let mut stmt = conn
            .prepare("SELECT path, id, hash, modified_at FROM files WHERE sync_root_id = ?1")?;
        let rows = stmt.query_map(params![sync_root_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                StoredFileMeta {
                    id: row.get(1)?,
                    hash: row.get(2)?,
                    modified_at: row.get(3)?,
                },
            ))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (path, meta) = row?;
            map.insert(path, meta);
        }
        Ok(map)
    })
    .await
}

/// Record a detected content change: new size/hash/mtime, status back to
/// PENDING, error cleared.
pub async fn update_changed(
    db: &Db,
    file_id: i64,
    size: u64,
    hash: &str,
    modified_at: Option<String>,
) -> Result<()> {
    let hash = hash.to_string();
    db.with_connection(move |conn| {
        let updated = conn.execute(
            "UPDATE files SET size = ?1, hash = ?2, modified_at = ?3,
                 status = 0, error_message = NULL, last_processed = NULL
             WHERE id = ?4",
            params![size as i64, hash, modified_at, file_id],
        )?;
        if updated == 0 {
            return Err(KbaseError::FileNotFound(file_id));
        }
        Ok(())
    })
    .await
}

/// Refresh only the stored modification time, leaving status untouched.
/// Used when a file was touched on disk but its content hash is unchanged.
pub async fn update_modified_at(db: &Db, file_id: i64, modified_at: Option<String>) -> Result<()> {
    db.with_connection(move |conn| {
        conn.execute(
            "UPDATE files SET modified_at = ?1 WHERE id = ?2",
            params![modified_at, file_id],
        )?;
        Ok(())
    })
    .await
}

/// Persist a status transition, stamping last_processed and the error message
pub async fn update_status(
    db: &Db,
    file_id: i64,
    status: FileStatus,
    error_message: Option<String>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    db.with_connection(move |conn| {
        let updated = conn.execute(
            "UPDATE files SET status = ?1, last_processed = ?2, error_message = ?3 WHERE id = ?4",
            params![status.as_i64(), now, error_message, file_id],
        )?;
        if updated == 0 {
            return Err(KbaseError::FileNotFound(file_id));
        }
        Ok(())
    })
    .await
}

/// Persist the extracted mime type and content length after parsing
pub async fn update_extraction_metadata(
    db: &Db,
    file_id: i64,
    mime_type: &str,
    content_length: i64,
) -> Result<()> {
    let mime_type = mime_type.to_string();
    db.with_connection(move |conn| {
        conn.execute(
            "UPDATE files SET mime_type = ?1, content_length = ?2 WHERE id = ?3",
            params![mime_type, content_length, file_id],
        )?;
        Ok(())
    })
    .await
}

/// Fetch up to `limit` files awaiting processing
pub async fn get_pending_files(db: &Db, limit: usize) -> Result<Vec<FileRecord>> {
    db.with_connection(move |conn| {
        let sql = format!(
            "SELECT {} FROM files WHERE status = 0 ORDER BY id LIMIT ?1",
            FILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], row_to_file)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })
    .await
}

/// Fetch up to `limit` files in a terminal failure state
pub async fn get_failed_files(db: &Db, limit: usize) -> Result<Vec<FileRecord>> {
    db.with_connection(move |conn| {
        let sql = format!(
            "SELECT {} FROM files WHERE status IN (-1, -2) ORDER BY id LIMIT ?1",
            FILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], row_to_file)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })
    .await
}

/// Reset files to PENDING, clearing error message and last processed time
pub async fn reset_for_retry(db: &Db, file_ids: &[i64]) -> Result<usize> {
    if file_ids.is_empty() {
        return Ok(0);
    }
    let ids = file_ids.to_vec();
    db.with_connection(move |conn| {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "UPDATE files SET status = 0, error_message = NULL, last_processed = NULL
             WHERE id IN ({})",
            placeholders
        );
        let count = conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
        Ok(count)
    })
    .await
}

/// Delete a file row. Chunks must already be gone.
pub async fn delete_file_row(db: &Db, file_id: i64) -> Result<()> {
    db.with_connection(move |conn| {
        conn.execute("DELETE FROM files WHERE id = ?1", params![file_id])?;
        Ok(())
    })
    .await
}

/// All files registered under one sync root
pub async fn list_by_sync_root(db: &Db, sync_root_id: i64) -> Result<Vec<FileRecord>> {
    db.with_connection(move |conn| {
        let sql = format!(
            "SELECT {} FROM files WHERE sync_root_id = ?1 ORDER BY id",
            FILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![sync_root_id], row_to_file)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })
    .await
}

/// Aggregate file counts by processing phase
#[derive(Debug, Default, Clone)]
pub struct FileStatusCounts {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Count files grouped into pending / in-flight / completed / failed buckets
pub async fn status_counts(db: &Db) -> Result<FileStatusCounts> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM files GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        let mut counts = FileStatusCounts::default();
        for row in rows {
            let (status, n) = row?;
            counts.total += n;
            match status {
                0 => counts.pending += n,
                1..=5 => counts.processing += n,
                6 => counts.completed += n,
                _ => counts.failed += n,
            }
        }
        Ok(counts)
    })
    .await
}
