use rusqlite::params;

use crate::db::Db;
use crate::error::{KbaseError, Result};

/// A named collection of sync roots sharing one vector-store table
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Name of the vector-store table backing a knowledge base
pub fn vector_table_name(kb_id: i64) -> String {
    format!("kb_{}", kb_id)
}

/// Create a knowledge base
pub async fn create_kb(db: &Db, name: &str, description: Option<&str>) -> Result<i64> {
    let name = name.to_string();
    let description = description.map(String::from);
    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO knowledge_bases (name, description) VALUES (?1, ?2)",
            params![name, description],
        )?;
        Ok(conn.last_insert_rowid())
    })
    .await
}

/// Fetch a knowledge base by id
pub async fn get_kb(db: &Db, kb_id: i64) -> Result<Option<KnowledgeBase>> {
    db.with_connection(move |conn| {
        let mut stmt =
            conn.prepare("SELECT id, name, description FROM knowledge_bases WHERE id = ?1")?;
        let mut rows = stmt.query(params![kb_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(KnowledgeBase {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
            }));
        }
        Ok(None)
    })
    .await
}

/// List all knowledge bases
pub async fn get_all_kbs(db: &Db) -> Result<Vec<KnowledgeBase>> {
    db.with_connection(|conn| {
        let mut stmt =
            conn.prepare("SELECT id, name, description FROM knowledge_bases ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(KnowledgeBase {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
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

/// Create the Default knowledge base on first boot if none exists
pub async fn seed_default_kb(db: &Db) -> Result<()> {
    let existing = get_all_kbs(db).await?;
    if existing.is_empty() {
        create_kb(db, "Default", Some("Default Knowledge Base")).await?;
        log::info!("Default knowledge base created");
    }
    Ok(())
}

/// Remove the knowledge base row itself
pub async fn delete_kb_row(db: &Db, kb_id: i64) -> Result<()> {
    db.with_connection(move |conn| {
        conn.execute("DELETE FROM knowledge_bases WHERE id = ?1", params![kb_id])?;
        Ok(())
    })
    .await
}

/// Detach a knowledge base from every chat session that references it.
///
/// Sessions keep a JSON list of knowledge-base ids; the id is removed from the
/// list, and sessions left referencing no knowledge base are deleted.
/// Returns (sessions updated, sessions deleted).
pub async fn detach_kb_from_sessions(db: &Db, kb_id: i64) -> Result<(usize, usize)> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare("SELECT id, kb_ids FROM chat_sessions WHERE kb_ids IS NOT NULL")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut sessions: Vec<(i64, Vec<i64>)> = Vec::new();
        for row in rows {
            let (session_id, kb_ids_json) = row?;
            let kb_ids: Vec<i64> = serde_json::from_str(&kb_ids_json)
                .map_err(|e| KbaseError::Parse(format!("chat session kb_ids: {}", e)))?;
            if kb_ids.contains(&kb_id) {
                sessions.push((session_id, kb_ids));
            }
        }

        let mut updated = 0;
        let mut deleted = 0;
        for (session_id, kb_ids) in sessions {
            let remaining: Vec<i64> = kb_ids.into_iter().filter(|id| *id != kb_id).collect();
            if remaining.is_empty() {
                conn.execute("DELETE FROM chat_sessions WHERE id = ?1", params![session_id])?;
                deleted += 1;
            } else {
                let json = serde_json::to_string(&remaining)
                    .map_err(|e| KbaseError::Parse(e.to_string()))?;
                conn.execute(
                    "UPDATE chat_sessions SET kb_ids = ?1 WHERE id = ?2",
                    params![json, session_id],
                )?;
                updated += 1;
            }
        }

        Ok((updated, deleted))
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

    async fn insert_session(db: &Db, session_id: &str, kb_ids: &[i64]) {
        let session_id = session_id.to_string();
        let json = serde_json::to_string(kb_ids).unwrap();
        db.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO chat_sessions (session_id, kb_ids) VALUES (?1, ?2)",
                params![session_id, json],
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_vector_table_name() {
        assert_eq!(vector_table_name(7), "kb_7");
    }

    #[tokio::test]
    async fn test_seed_default_once() {
        let (db, _tmp) = setup_db().await;
        seed_default_kb(&db).await.unwrap();
        seed_default_kb(&db).await.unwrap();

        let kbs = get_all_kbs(&db).await.unwrap();
        assert_eq!(kbs.len(), 1);
        assert_eq!(kbs[0].name, "Default");
    }

    #[tokio::test]
    async fn test_detach_updates_and_deletes_sessions() {
        let (db, _tmp) = setup_db().await;
        insert_session(&db, "s1", &[1, 2]).await;
        insert_session(&db, "s2", &[1]).await;
        insert_session(&db, "s3", &[2]).await;

        let (updated, deleted) = detach_kb_from_sessions(&db, 1).await.unwrap();
        assert_eq!(updated, 1); // s1 keeps kb 2
        assert_eq!(deleted, 1); // s2 had only kb 1

        let remaining: Vec<(String, String)> = db
            .with_connection(|conn| {
                let mut stmt =
                    conn.prepare("SELECT session_id, kb_ids FROM chat_sessions ORDER BY session_id")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok::<_, KbaseError>(out)
            })
            .await
            .unwrap();

        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].0, "s1");
        assert_eq!(remaining[0].1, "[2]");
        assert_eq!(remaining[1].0, "s3");
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let (db, _tmp) = setup_db().await;
        let id = create_kb(&db, "Research", None).await.unwrap();
        assert!(get_kb(&db, id).await.unwrap().is_some());
        delete_kb_row(&db, id).await.unwrap();
        assert!(get_kb(&db, id).await.unwrap().is_none());
    }
}
