use std::sync::Arc;

use anyhow::Result;

use kbase::config::Config;
use kbase::db::chunks::count_all_chunks;
use kbase::db::files::status_counts;
use kbase::db::kb::{get_all_kbs, vector_table_name};
use kbase::db::sync_roots::get_all_sync_roots;
use kbase::db::Db;
use kbase::vector::{HttpEmbedder, LocalVectorStore, VectorStore};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let config = Config::load()?;
    let db = Db::new(config.db_path());
    db.migrate().await?;

    let embedder = Arc::new(HttpEmbedder::from_config(&config.embeddings));
    let vector = LocalVectorStore::new(db.clone(), embedder);

    let counts = status_counts(&db).await?;
    println!("Files: {} total", counts.total);
    println!("  pending:    {}", counts.pending);
    println!("  processing: {}", counts.processing);
    println!("  completed:  {}", counts.completed);
    println!("  failed:     {}", counts.failed);

    let total_chunks = count_all_chunks(&db).await?;
    println!("Chunks: {}", total_chunks);
    if counts.completed > 0 {
        println!(
            "  avg per completed file: {:.1}",
            total_chunks as f64 / counts.completed as f64
        );
    }

    println!("Sync roots:");
    for root in get_all_sync_roots(&db).await? {
        println!(
            "  [{}] {} ({}, kb {})",
            root.id,
            root.dir_path,
            root.sync_mode.as_str(),
            root.kb_id
        );
    }

    println!("Knowledge bases:");
    for kb in get_all_kbs(&db).await? {
        let rows = vector.count_rows(&vector_table_name(kb.id)).await?;
        println!("  [{}] {} ({} vector rows)", kb.id, kb.name, rows);
    }

    Ok(())
}
