//! Cascading deletion: vector entries first, then chunk rows, then the file
//! record. Bulk paths batch the vector delete across all file ids and report
//! exactly what succeeded instead of aborting on the first error.

use crate::db::chunks::{count_chunks_for_file, delete_chunks_for_file, delete_chunks_for_files};
use crate::db::files::{self, delete_file_row};
use crate::db::kb::{self, vector_table_name};
use crate::db::sync_logs::delete_sync_logs_for_kb;
use crate::db::sync_roots::{self, SyncRoot};
use crate::db::Db;
use crate::error::{KbaseError, Result};
use crate::vector::VectorStore;

/// Per-category counts and partial-failure errors for a bulk deletion
#[derive(Debug, Default, Clone)]
pub struct DeletionReport {
    pub deleted_files: usize,
    pub deleted_chunks: usize,
    /// Files covered by a vector-store delete call that succeeded (a file
    /// with zero vector entries still counts)
    pub vector_deletion_success_count: usize,
    pub errors: Vec<String>,
}

impl DeletionReport {
    fn merge(&mut self, other: DeletionReport) {
        self.deleted_files += other.deleted_files;
        self.deleted_chunks += other.deleted_chunks;
        self.vector_deletion_success_count += other.vector_deletion_success_count;
        self.errors.extend(other.errors);
    }
}

/// Delete one file and all its data: vector entries, chunk rows, then the
/// file record.
///
/// Vector deletion is best effort: a count mismatch or backend error is
/// reported and the cascade proceeds, so on-disk state never blocks cleanup.
pub async fn delete_file(db: &Db, vector: &dyn VectorStore, file_id: i64) -> Result<DeletionReport> {
    let file = files::get_file(db, file_id)
        .await?
        .ok_or(KbaseError::FileNotFound(file_id))?;
    let table = vector_table_name(file.kb_id);

    let mut report = DeletionReport::default();
    let expected = count_chunks_for_file(db, file_id).await?;

    match vector.delete_by_file_ids(&table, &[file_id]).await {
        Ok(removed) => {
            report.vector_deletion_success_count = 1;
            if removed != expected {
                log::warn!(
                    "Vector deletion mismatch for file {}: expected {}, removed {}",
                    file_id,
                    expected,
                    removed
                );
            }
        }
        Err(e) => {
            log::warn!("Vector deletion failed for file {}: {}", file_id, e);
            report.errors.push(format!("vector delete file {}: {}", file_id, e));
        }
    }

    report.deleted_chunks = delete_chunks_for_file(db, file_id).await?;
    delete_file_row(db, file_id).await?;
    report.deleted_files = 1;

    log::info!(
        "Deleted file {} ({} chunks)",
        file.path,
        report.deleted_chunks
    );
    Ok(report)
}

/// Delete all files under a sync root: one batched vector delete keyed by the
/// full file id set, then chunk rows, then file rows. Never aborts on a
/// partial failure; the report says what succeeded.
pub async fn delete_sync_root_files(
    db: &Db,
    vector: &dyn VectorStore,
    root: &SyncRoot,
) -> DeletionReport {
    let mut report = DeletionReport::default();

    let records = match files::list_by_sync_root(db, root.id).await {
        Ok(records) => records,
        Err(e) => {
            report.errors.push(format!("list files for root {}: {}", root.id, e));
            return report;
        }
    };
    if records.is_empty() {
        return report;
    }

    let file_ids: Vec<i64> = records.iter().map(|f| f.id).collect();
    let table = vector_table_name(root.kb_id);

    match vector.delete_by_file_ids(&table, &file_ids).await {
        Ok(removed) => {
            report.vector_deletion_success_count = file_ids.len();
            log::debug!(
                "Batched vector delete for root {} removed {} entries",
                root.id,
                removed
            );
        }
        Err(e) => {
            log::warn!("Batched vector delete failed for root {}: {}", root.id, e);
            report.errors.push(format!("vector delete root {}: {}", root.id, e));
        }
    }

    match delete_chunks_for_files(db, &file_ids).await {
        Ok(removed) => report.deleted_chunks = removed,
        Err(e) => report.errors.push(format!("chunk delete root {}: {}", root.id, e)),
    }

    for file_id in file_ids {
        match delete_file_row(db, file_id).await {
            Ok(()) => report.deleted_files += 1,
            Err(e) => report.errors.push(format!("file row {}: {}", file_id, e)),
        }
    }

    log::info!(
        "Deleted {} files ({} chunks) under sync root {}",
        report.deleted_files,
        report.deleted_chunks,
        root.id
    );
    report
}

/// Delete a sync root, optionally cleaning up its files first
pub async fn delete_sync_root(
    db: &Db,
    vector: &dyn VectorStore,
    root_id: i64,
    cleanup_data: bool,
) -> Result<DeletionReport> {
    let root = sync_roots::get_sync_root(db, root_id)
        .await?
        .ok_or(KbaseError::SyncRootNotFound(root_id))?;

    let report = if cleanup_data {
        delete_sync_root_files(db, vector, &root).await
    } else {
        DeletionReport::default()
    };

    sync_roots::delete_sync_root_row(db, root_id).await?;
    log::info!("Deleted sync root {} ({})", root_id, root.dir_path);
    Ok(report)
}

/// Delete a knowledge base: every sync root's files, the root rows, the sync
/// logs, the chat-session references, and finally the knowledge-base row.
pub async fn delete_knowledge_base(
    db: &Db,
    vector: &dyn VectorStore,
    kb_id: i64,
) -> Result<DeletionReport> {
    let roots = sync_roots::get_sync_roots_by_kb(db, kb_id).await?;

    let mut report = DeletionReport::default();
    for root in &roots {
        report.merge(delete_sync_root_files(db, vector, root).await);
        if let Err(e) = sync_roots::delete_sync_root_row(db, root.id).await {
            report.errors.push(format!("sync root row {}: {}", root.id, e));
        }
    }

    let removed_logs = delete_sync_logs_for_kb(db, kb_id).await?;
    let (updated_sessions, deleted_sessions) = kb::detach_kb_from_sessions(db, kb_id).await?;
    kb::delete_kb_row(db, kb_id).await?;

    log::info!(
        "Deleted knowledge base {}: {} roots, {} files, {} logs, sessions updated {} deleted {}",
        kb_id,
        roots.len(),
        report.deleted_files,
        removed_logs,
        updated_sessions,
        deleted_sessions
    );
    Ok(report)
}
