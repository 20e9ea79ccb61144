use rusqlite::Connection;
use std::path::Path;
use tokio::task;

use crate::error::{KbaseError, Result};

pub mod migrate;

pub mod chunks;
pub mod files;
pub mod kb;
pub mod sync_logs;
pub mod sync_roots;

/// Database connection wrapper
///
/// Opens a fresh connection per operation inside a blocking task; sqlite in
/// WAL mode handles the concurrent readers this produces.
#[derive(Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

const PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536;";

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Open a new database connection with the standard pragmas
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(KbaseError::Database)?;
        conn.execute_batch(PRAGMAS)?;
        Ok(conn)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = Connection::open(&path).map_err(KbaseError::Database)?;
            conn.execute_batch(PRAGMAS)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| KbaseError::Config(format!("database task join: {}", e)))?
    }

    /// Run all pending migrations
    pub async fn migrate(&self) -> Result<()> {
        self.with_connection(|conn| migrate::run_migrations(conn)).await
    }
}
