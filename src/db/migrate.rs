use rusqlite::{params, Connection};

use crate::error::{KbaseError, Result};

/// A single schema migration, embedded in the binary
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_core_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS knowledge_bases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS sync_roots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kb_id INTEGER NOT NULL,
    dir_path TEXT NOT NULL,
    sync_mode TEXT NOT NULL DEFAULT 'manual',
    recursive INTEGER NOT NULL DEFAULT 1,
    ignore_hidden INTEGER NOT NULL DEFAULT 1,
    ignore_large INTEGER NOT NULL DEFAULT 1,
    file_types TEXT NOT NULL DEFAULT '',
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    size INTEGER NOT NULL,
    hash TEXT NOT NULL,
    modified_at TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    status INTEGER NOT NULL DEFAULT 0,
    sync_root_id INTEGER NOT NULL,
    kb_id INTEGER NOT NULL,
    mime_type TEXT,
    content_length INTEGER,
    last_processed TEXT,
    error_message TEXT,
    UNIQUE (path, sync_root_id)
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files (id),
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS sync_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sync_root_id INTEGER NOT NULL,
    kb_id INTEGER,
    start_time TEXT NOT NULL,
    end_time TEXT,
    status TEXT NOT NULL,
    total_files INTEGER NOT NULL DEFAULT 0,
    synced_files INTEGER NOT NULL DEFAULT 0,
    failed_files INTEGER NOT NULL DEFAULT 0,
    message TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS chat_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL UNIQUE,
    title TEXT,
    kb_ids TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: 2,
        name: "002_vector_entries",
        sql: r#"
CREATE TABLE IF NOT EXISTS vector_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    file_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT,
    embedding BLOB,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: 3,
        name: "003_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_files_status ON files (status);
CREATE INDEX IF NOT EXISTS idx_files_sync_root ON files (sync_root_id);
CREATE INDEX IF NOT EXISTS idx_files_hash ON files (hash);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks (file_id);
CREATE INDEX IF NOT EXISTS idx_sync_logs_root ON sync_logs (sync_root_id);
CREATE INDEX IF NOT EXISTS idx_vector_entries_table_file ON vector_entries (table_name, file_id);
"#,
    },
];

/// Create schema_migrations table if it doesn't exist
fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get list of applied migrations
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
        .map_err(KbaseError::Database)?;
    Ok(names)
}

/// Run all pending migrations
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_migrations(conn)?;

    for migration in MIGRATIONS {
        if applied.iter().any(|name| name == migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!(
            "Applying migration: {} (version {})",
            migration.name,
            migration.version
        );

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    log::debug!("All migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_migrations_create_all_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let mut conn = Connection::open(&db_path).unwrap();

        run_migrations(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap();

        for table in [
            "knowledge_bases",
            "sync_roots",
            "files",
            "chunks",
            "sync_logs",
            "chat_sessions",
            "vector_entries",
            "schema_migrations",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table: {}", table);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let mut conn = Connection::open(&db_path).unwrap();

        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let applied = get_applied_migrations(&conn).unwrap();
        assert_eq!(applied.len(), MIGRATIONS.len());
    }

    #[test]
    fn test_files_path_unique_per_root() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let mut conn = Connection::open(&db_path).unwrap();
        run_migrations(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO files (name, path, size, hash, status, sync_root_id, kb_id)
             VALUES ('a.txt', '/tmp/a.txt', 1, 'h1', 0, 1, 1)",
            [],
        )
        .unwrap();

        // Same path under the same root violates the unique constraint
        let dup = conn.execute(
            "INSERT INTO files (name, path, size, hash, status, sync_root_id, kb_id)
             VALUES ('a.txt', '/tmp/a.txt', 1, 'h2', 0, 1, 1)",
            [],
        );
        assert!(dup.is_err());

        // Same path under a different root is fine
        conn.execute(
            "INSERT INTO files (name, path, size, hash, status, sync_root_id, kb_id)
             VALUES ('a.txt', '/tmp/a.txt', 1, 'h3', 0, 2, 1)",
            [],
        )
        .unwrap();
    }
}
