use rusqlite::params;

use crate::db::Db;
use crate::error::{KbaseError, Result};

/// One unit of indexed text belonging to a file
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub file_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

/// Insert payload for a chunk row
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub file_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Insert chunk rows for a file in one transaction.
///
/// Indices are expected to be dense and 0-based; callers delete any rows from
/// a previous attempt first so a retry starts over at index 0.
pub async fn insert_chunks(db: &Db, chunks: Vec<NewChunk>) -> Result<usize> {
    if chunks.is_empty() {
        return Ok(0);
    }

    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (file_id, chunk_index, content, metadata)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for chunk in &chunks {
                stmt.execute(params![
                    chunk.file_id,
                    chunk.chunk_index,
                    chunk.content,
                    chunk.metadata.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(chunks.len())
    })
    .await
}

/// Fetch all chunks for a file, ordered by chunk index
pub async fn get_file_chunks(db: &Db, file_id: i64) -> Result<Vec<ChunkRecord>> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, file_id, chunk_index, content, metadata
             FROM chunks WHERE file_id = ?1 ORDER BY chunk_index",
        )?;
        let rows = stmt.query_map(params![file_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, file_id, chunk_index, content, metadata) = row?;
            let metadata = metadata.and_then(|m| serde_json::from_str(&m).ok());
            out.push(ChunkRecord {
                id,
                file_id,
                chunk_index,
                content,
                metadata,
            });
        }
        Ok(out)
    })
    .await
}

/// Delete all chunk rows for one file. Returns the number of rows removed.
pub async fn delete_chunks_for_file(db: &Db, file_id: i64) -> Result<usize> {
    db.with_connection(move |conn| {
        let count = conn.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;
        Ok(count)
    })
    .await
}

/// Delete chunk rows for a set of files in one statement
pub async fn delete_chunks_for_files(db: &Db, file_ids: &[i64]) -> Result<usize> {
    if file_ids.is_empty() {
        return Ok(0);
    }
    let ids = file_ids.to_vec();
    db.with_connection(move |conn| {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM chunks WHERE file_id IN ({})", placeholders);
        let count = conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
        Ok(count)
    })
    .await
}

/// Count chunk rows for one file
pub async fn count_chunks_for_file(db: &Db, file_id: i64) -> Result<usize> {
    db.with_connection(move |conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE file_id = ?1",
            params![file_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    })
    .await
}

/// Total chunk count across all files
pub async fn count_all_chunks(db: &Db) -> Result<usize> {
    db.with_connection(|conn| {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok::<usize, KbaseError>(count as usize)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::files::{create_file, NewFile};
    use tempfile::TempDir;

    async fn setup_db() -> (Db, TempDir, i64) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        db.migrate().await.unwrap();
        let file_id = create_file(
            &db,
            NewFile {
                name: "a.txt".to_string(),
                path: "/docs/a.txt".to_string(),
                size: 10,
                hash: "h1".to_string(),
                modified_at: None,
                sync_root_id: 1,
                kb_id: 1,
            },
        )
        .await
        .unwrap();
        (db, temp_dir, file_id)
    }

    fn chunk(file_id: i64, index: i64, content: &str) -> NewChunk {
        NewChunk {
            file_id,
            chunk_index: index,
            content: content.to_string(),
            metadata: serde_json::json!({ "chunkIndex": index }),
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_ordered() {
        let (db, _tmp, file_id) = setup_db().await;

        let n = insert_chunks(
            &db,
            vec![
                chunk(file_id, 0, "first"),
                chunk(file_id, 1, "second"),
                chunk(file_id, 2, "third"),
            ],
        )
        .await
        .unwrap();
        assert_eq!(n, 3);

        let chunks = get_file_chunks(&db, file_id).await.unwrap();
        assert_eq!(chunks.len(), 3);
        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(chunks[0].content, "first");
        assert_eq!(
            chunks[1].metadata.as_ref().unwrap()["chunkIndex"],
            serde_json::json!(1)
        );
    }

    #[tokio::test]
    async fn test_insert_empty_is_noop() {
        let (db, _tmp, _file_id) = setup_db().await;
        assert_eq!(insert_chunks(&db, Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_chunks_for_file() {
        let (db, _tmp, file_id) = setup_db().await;
        insert_chunks(&db, vec![chunk(file_id, 0, "a"), chunk(file_id, 1, "b")])
            .await
            .unwrap();

        let removed = delete_chunks_for_file(&db, file_id).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(count_chunks_for_file(&db, file_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_chunks_for_files_batch() {
        let (db, _tmp, file_id) = setup_db().await;
        let other = create_file(
            &db,
            NewFile {
                name: "b.txt".to_string(),
                path: "/docs/b.txt".to_string(),
                size: 10,
                hash: "h2".to_string(),
                modified_at: None,
                sync_root_id: 1,
                kb_id: 1,
            },
        )
        .await
        .unwrap();
        insert_chunks(&db, vec![chunk(file_id, 0, "a"), chunk(other, 0, "b")])
            .await
            .unwrap();

        let removed = delete_chunks_for_files(&db, &[file_id, other]).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(count_all_chunks(&db).await.unwrap(), 0);
    }
}
