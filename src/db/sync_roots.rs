use rusqlite::{params, Row};

use crate::db::Db;
use crate::error::{KbaseError, Result};

/// How a registered directory is kept in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Realtime,
    Manual,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Realtime => "realtime",
            SyncMode::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "realtime" => SyncMode::Realtime,
            _ => SyncMode::Manual,
        }
    }
}

/// A filesystem directory registered for ingestion into one knowledge base
#[derive(Debug, Clone)]
pub struct SyncRoot {
    pub id: i64,
    pub kb_id: i64,
    pub dir_path: String,
    pub sync_mode: SyncMode,
    pub recursive: bool,
    pub ignore_hidden: bool,
    pub ignore_large: bool,
    /// Comma-separated allowed extensions; empty means "all supported"
    pub file_types: String,
}

impl SyncRoot {
    /// Allowed extensions as a normalized list; empty list means no filter
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.file_types
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Insert payload for a new sync root
#[derive(Debug, Clone)]
pub struct NewSyncRoot {
    pub kb_id: i64,
    pub dir_path: String,
    pub sync_mode: SyncMode,
    pub recursive: bool,
    pub ignore_hidden: bool,
    pub ignore_large: bool,
    pub file_types: String,
}

fn row_to_root(row: &Row<'_>) -> rusqlite::Result<SyncRoot> {
    let mode: String = row.get(3)?;
    Ok(SyncRoot {
        id: row.get(0)?,
        kb_id: row.get(1)?,
        dir_path: row.get(2)?,
        sync_mode: SyncMode::from_str(&mode),
        recursive: row.get::<_, i64>(4)? != 0,
        ignore_hidden: row.get::<_, i64>(5)? != 0,
        ignore_large: row.get::<_, i64>(6)? != 0,
        file_types: row.get(7)?,
    })
}

const ROOT_COLUMNS: &str =
    "id, kb_id, dir_path, sync_mode, recursive, ignore_hidden, ignore_large, file_types";

/// Register a new sync root. Fails if the same path is already registered in
/// the same knowledge base.
pub async fn create_sync_root(db: &Db, root: NewSyncRoot) -> Result<SyncRoot> {
    if path_conflicts(db, root.kb_id, &root.dir_path, None).await? {
        return Err(KbaseError::Config(format!(
            "Directory already registered in this knowledge base: {}",
            root.dir_path
        )));
    }

    let id = db
        .with_connection(move |conn| {
            conn.execute(
                "INSERT INTO sync_roots
                     (kb_id, dir_path, sync_mode, recursive, ignore_hidden, ignore_large, file_types)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    root.kb_id,
                    root.dir_path,
                    root.sync_mode.as_str(),
                    root.recursive as i64,
                    root.ignore_hidden as i64,
                    root.ignore_large as i64,
                    root.file_types,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?;

    get_sync_root(db, id)
        .await?
        .ok_or(KbaseError::SyncRootNotFound(id))
}

/// Fetch a sync root by id
pub async fn get_sync_root(db: &Db, id: i64) -> Result<Option<SyncRoot>> {
    db.with_connection(move |conn| {
        let sql = format!("SELECT {} FROM sync_roots WHERE id = ?1", ROOT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row_to_root(row)?));
        }
        Ok(None)
    })
    .await
}

/// List every registered sync root
pub async fn get_all_sync_roots(db: &Db) -> Result<Vec<SyncRoot>> {
    db.with_connection(|conn| {
        let sql = format!("SELECT {} FROM sync_roots ORDER BY id", ROOT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_root)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })
    .await
}

/// List the sync roots owned by one knowledge base
pub async fn get_sync_roots_by_kb(db: &Db, kb_id: i64) -> Result<Vec<SyncRoot>> {
    db.with_connection(move |conn| {
        let sql = format!(
            "SELECT {} FROM sync_roots WHERE kb_id = ?1 ORDER BY id",
            ROOT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![kb_id], row_to_root)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })
    .await
}

/// Check whether `dir_path` is already registered for `kb_id`, optionally
/// ignoring one existing row (for path updates).
pub async fn path_conflicts(
    db: &Db,
    kb_id: i64,
    dir_path: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let dir_path = dir_path.to_string();
    db.with_connection(move |conn| {
        let exists = match exclude_id {
            Some(id) => {
                let mut stmt = conn.prepare(
                    "SELECT 1 FROM sync_roots WHERE kb_id = ?1 AND dir_path = ?2 AND id != ?3 LIMIT 1",
                )?;
                stmt.exists(params![kb_id, dir_path, id])?
            }
            None => {
                let mut stmt = conn
                    .prepare("SELECT 1 FROM sync_roots WHERE kb_id = ?1 AND dir_path = ?2 LIMIT 1")?;
                stmt.exists(params![kb_id, dir_path])?
            }
        };
        Ok(exists)
    })
    .await
}

/// Update a sync root's path, checking for conflicts against siblings
pub async fn update_dir_path(db: &Db, id: i64, dir_path: &str) -> Result<()> {
    let root = get_sync_root(db, id)
        .await?
        .ok_or(KbaseError::SyncRootNotFound(id))?;
    if path_conflicts(db, root.kb_id, dir_path, Some(id)).await? {
        return Err(KbaseError::Config(format!(
            "Directory already registered in this knowledge base: {}",
            dir_path
        )));
    }
    let dir_path = dir_path.to_string();
    db.with_connection(move |conn| {
        conn.execute(
            "UPDATE sync_roots SET dir_path = ?1 WHERE id = ?2",
            params![dir_path, id],
        )?;
        Ok(())
    })
    .await
}

/// Remove a sync root row
pub async fn delete_sync_root_row(db: &Db, id: i64) -> Result<()> {
    db.with_connection(move |conn| {
        conn.execute("DELETE FROM sync_roots WHERE id = ?1", params![id])?;
        Ok(())
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

    fn new_root(kb_id: i64, path: &str) -> NewSyncRoot {
        NewSyncRoot {
            kb_id,
            dir_path: path.to_string(),
            sync_mode: SyncMode::Manual,
            recursive: true,
            ignore_hidden: true,
            ignore_large: true,
            file_types: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (db, _tmp) = setup_db().await;
        let root = create_sync_root(&db, new_root(1, "/docs")).await.unwrap();
        assert_eq!(root.kb_id, 1);
        assert_eq!(root.sync_mode, SyncMode::Manual);
        assert!(root.recursive);

        let fetched = get_sync_root(&db, root.id).await.unwrap().unwrap();
        assert_eq!(fetched.dir_path, "/docs");
    }

    #[tokio::test]
    async fn test_duplicate_path_rejected() {
        let (db, _tmp) = setup_db().await;
        create_sync_root(&db, new_root(1, "/docs")).await.unwrap();

        let dup = create_sync_root(&db, new_root(1, "/docs")).await;
        assert!(dup.is_err());

        // Same path under another knowledge base is allowed
        let other_kb = create_sync_root(&db, new_root(2, "/docs")).await;
        assert!(other_kb.is_ok());
    }

    #[tokio::test]
    async fn test_update_path_conflict_check() {
        let (db, _tmp) = setup_db().await;
        let a = create_sync_root(&db, new_root(1, "/docs")).await.unwrap();
        let b = create_sync_root(&db, new_root(1, "/notes")).await.unwrap();

        // Updating to a sibling's path is a conflict
        assert!(update_dir_path(&db, b.id, "/docs").await.is_err());
        // Updating to itself is fine
        assert!(update_dir_path(&db, a.id, "/docs").await.is_ok());
    }

    #[tokio::test]
    async fn test_allowed_extensions_parsing() {
        let root = SyncRoot {
            id: 1,
            kb_id: 1,
            dir_path: "/docs".to_string(),
            sync_mode: SyncMode::Manual,
            recursive: true,
            ignore_hidden: true,
            ignore_large: true,
            file_types: ".md, txt,PDF ,".to_string(),
        };
        assert_eq!(root.allowed_extensions(), vec!["md", "txt", "pdf"]);

        let unfiltered = SyncRoot {
            file_types: String::new(),
            ..root
        };
        assert!(unfiltered.allowed_extensions().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_kb() {
        let (db, _tmp) = setup_db().await;
        create_sync_root(&db, new_root(1, "/a")).await.unwrap();
        create_sync_root(&db, new_root(1, "/b")).await.unwrap();
        create_sync_root(&db, new_root(2, "/c")).await.unwrap();

        assert_eq!(get_sync_roots_by_kb(&db, 1).await.unwrap().len(), 2);
        assert_eq!(get_all_sync_roots(&db).await.unwrap().len(), 3);
    }
}
