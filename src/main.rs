use std::sync::Arc;

use anyhow::Result;

use kbase::config::Config;
use kbase::db::kb::seed_default_kb;
use kbase::db::sync_roots::{get_all_sync_roots, SyncMode};
use kbase::db::Db;
use kbase::pipeline::TaskProcessor;
use kbase::sync::{run_watcher, scan_sync_root};
use kbase::vector::{HttpEmbedder, LocalVectorStore};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "verify" => run_schema_verification().await?,
        "run" | _ => run_service().await?,
    }

    Ok(())
}

/// Run the ingestion service: seed the default knowledge base, start a
/// realtime watcher for every realtime sync root (with an initial catch-up
/// scan), start the background task processor, and wait for ctrl-c.
async fn run_service() -> Result<()> {
    log::info!("Starting kbase v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    db.migrate().await?;
    seed_default_kb(&db).await?;
    log::info!("Database initialized");

    let embedder = Arc::new(HttpEmbedder::from_config(&config.embeddings));
    let vector = Arc::new(LocalVectorStore::new(db.clone(), embedder));

    // Realtime roots get an initial catch-up scan, then a live watcher
    let roots = get_all_sync_roots(&db).await?;
    for root in roots {
        if root.sync_mode != SyncMode::Realtime {
            continue;
        }
        match scan_sync_root(&db, &root, &config.sync).await {
            Ok(summary) => log::info!(
                "Catch-up scan for {}: {} added, {} updated",
                root.dir_path,
                summary.added,
                summary.updated
            ),
            Err(e) => log::error!("Catch-up scan failed for {}: {}", root.dir_path, e),
        }

        let watcher_db = db.clone();
        let sync_cfg = config.sync.clone();
        let dir_path = root.dir_path.clone();
        tokio::spawn(async move {
            if let Err(e) = run_watcher(watcher_db, root, sync_cfg).await {
                log::error!("Watcher for {} exited: {}", dir_path, e);
            }
        });
    }

    let processor = TaskProcessor::new(db, vector, config.processing.clone());
    processor.start();

    log::info!("kbase running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    processor.stop();
    log::info!("Shutdown complete");
    Ok(())
}

/// Verify that the expected database objects exist
async fn run_schema_verification() -> Result<()> {
    use kbase::error::KbaseError;

    let config = Config::load()?;
    let db = Db::new(config.db_path());
    db.migrate().await?;

    db.with_connection(|conn| {
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for table in [
            "knowledge_bases",
            "sync_roots",
            "files",
            "chunks",
            "sync_logs",
            "chat_sessions",
            "vector_entries",
        ] {
            if !tables.iter().any(|t| t == table) {
                return Err(KbaseError::Config(format!("Missing table: {}", table)));
            }
            log::debug!("Table exists: {}", table);
        }

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(KbaseError::Config(format!(
                "Journal mode is not WAL: {}",
                journal_mode
            )));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(KbaseError::Config(format!(
                "Database integrity check failed: {}",
                integrity
            )));
        }

        Ok(())
    })
    .await?;

    log::info!("Database schema verification complete");
    Ok(())
}
