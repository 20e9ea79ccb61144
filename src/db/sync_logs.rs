use chrono::Utc;
use rusqlite::params;

use crate::db::Db;
use crate::error::Result;

/// Terminal and in-flight states of a sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLogStatus {
    Running,
    Success,
    Failed,
}

impl SyncLogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncLogStatus::Running => "running",
            SyncLogStatus::Success => "success",
            SyncLogStatus::Failed => "failed",
        }
    }
}

/// Audit record of one scan or realtime event batch
#[derive(Debug, Clone)]
pub struct SyncLog {
    pub id: i64,
    pub sync_root_id: i64,
    pub kb_id: Option<i64>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: String,
    pub total_files: i64,
    pub synced_files: i64,
    pub failed_files: i64,
    pub message: Option<String>,
}

/// Open a sync log in `running` state. Returns the log id.
pub async fn create_sync_log(db: &Db, sync_root_id: i64, kb_id: i64) -> Result<i64> {
    let start = Utc::now().to_rfc3339();
    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO sync_logs (sync_root_id, kb_id, start_time, status)
             VALUES (?1, ?2, ?3, 'running')",
            params![sync_root_id, kb_id, start],
        )?;
        Ok(conn.last_insert_rowid())
    })
    .await
}

/// Finalize a sync log with counts and a terminal status. Finalized rows are
/// never touched again.
pub async fn finalize_sync_log(
    db: &Db,
    log_id: i64,
    status: SyncLogStatus,
    total_files: i64,
    synced_files: i64,
    failed_files: i64,
    message: Option<String>,
) -> Result<()> {
    let end = Utc::now().to_rfc3339();
    db.with_connection(move |conn| {
        conn.execute(
            "UPDATE sync_logs
             SET end_time = ?1, status = ?2, total_files = ?3, synced_files = ?4,
                 failed_files = ?5, message = ?6
             WHERE id = ?7",
            params![
                end,
                status.as_str(),
                total_files,
                synced_files,
                failed_files,
                message,
                log_id
            ],
        )?;
        Ok(())
    })
    .await
}

/// Fetch one sync log
pub async fn get_sync_log(db: &Db, log_id: i64) -> Result<Option<SyncLog>> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, sync_root_id, kb_id, start_time, end_time, status,
                    total_files, synced_files, failed_files, message
             FROM sync_logs WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![log_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(SyncLog {
                id: row.get(0)?,
                sync_root_id: row.get(1)?,
                kb_id: row.get(2)?,
                start_time: row.get(3)?,
                end_time: row.get(4)?,
                status: row.get(5)?,
                total_files: row.get(6)?,
                synced_files: row.get(7)?,
                failed_files: row.get(8)?,
                message: row.get(9)?,
            }));
        }
        Ok(None)
    })
    .await
}

/// Recent logs for a sync root, newest first
pub async fn get_sync_logs_for_root(db: &Db, sync_root_id: i64, limit: usize) -> Result<Vec<SyncLog>> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, sync_root_id, kb_id, start_time, end_time, status,
                    total_files, synced_files, failed_files, message
             FROM sync_logs WHERE sync_root_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![sync_root_id, limit as i64], |row| {
            Ok(SyncLog {
                id: row.get(0)?,
                sync_root_id: row.get(1)?,
                kb_id: row.get(2)?,
                start_time: row.get(3)?,
                end_time: row.get(4)?,
                status: row.get(5)?,
                total_files: row.get(6)?,
                synced_files: row.get(7)?,
                failed_files: row.get(8)?,
                message: row.get(9)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })
    .await
}

/// Delete all sync logs belonging to a knowledge base
pub async fn delete_sync_logs_for_kb(db: &Db, kb_id: i64) -> Result<usize> {
    db.with_connection(move |conn| {
        let count = conn.execute("DELETE FROM sync_logs WHERE kb_id = ?1", params![kb_id])?;
        Ok(count)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        db.migrate().await.unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_create_and_finalize() {
        let (db, _tmp) = setup_db().await;
        let log_id = create_sync_log(&db, 1, 1).await.unwrap();

        let running = get_sync_log(&db, log_id).await.unwrap().unwrap();
        assert_eq!(running.status, "running");
        assert!(running.end_time.is_none());

        finalize_sync_log(
            &db,
            log_id,
            SyncLogStatus::Success,
            3,
            2,
            1,
            Some("Sync completed".to_string()),
        )
        .await
        .unwrap();

        let done = get_sync_log(&db, log_id).await.unwrap().unwrap();
        assert_eq!(done.status, "success");
        assert_eq!(done.total_files, 3);
        assert_eq!(done.synced_files, 2);
        assert_eq!(done.failed_files, 1);
        assert!(done.end_time.is_some());
    }

    #[tokio::test]
    async fn test_logs_for_root_newest_first() {
        let (db, _tmp) = setup_db().await;
        let a = create_sync_log(&db, 1, 1).await.unwrap();
        let b = create_sync_log(&db, 1, 1).await.unwrap();
        create_sync_log(&db, 2, 1).await.unwrap();

        let logs = get_sync_logs_for_root(&db, 1, 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, b);
        assert_eq!(logs[1].id, a);
    }

    #[tokio::test]
    async fn test_delete_for_kb() {
        let (db, _tmp) = setup_db().await;
        create_sync_log(&db, 1, 1).await.unwrap();
        create_sync_log(&db, 2, 1).await.unwrap();
        create_sync_log(&db, 3, 2).await.unwrap();

        let removed = delete_sync_logs_for_kb(&db, 1).await.unwrap();
        assert_eq!(removed, 2);
    }
}
