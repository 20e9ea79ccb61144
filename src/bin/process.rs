use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use kbase::config::Config;
use kbase::db::Db;
use kbase::pipeline::TaskProcessor;
use kbase::vector::{HttpEmbedder, LocalVectorStore};

#[derive(Parser, Debug)]
#[command(name = "process")]
#[command(about = "Process pending files once, or retry failed ones")]
struct Args {
    /// Maximum number of files to fetch
    #[arg(short, long, default_value_t = 50)]
    limit: usize,

    /// Reset FAILED and EMBEDDING_FAILED files to PENDING and replay them
    #[arg(long)]
    retry_failed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let db = Db::new(config.db_path());
    db.migrate().await?;

    let embedder = Arc::new(HttpEmbedder::from_config(&config.embeddings));
    let vector = Arc::new(LocalVectorStore::new(db.clone(), embedder));
    let processor = TaskProcessor::new(db, vector, config.processing.clone());

    let stats = if args.retry_failed {
        processor.reprocess_failed(args.limit).await?
    } else {
        processor.process_once(args.limit).await?
    };

    if stats.total_files == 0 {
        log::info!("No files to process");
        return Ok(());
    }

    log::info!("=== Processing Complete ===");
    log::info!("Files: {} total, {} ok, {} failed ({:.1}% success)",
        stats.total_files,
        stats.successful_files,
        stats.failed_files,
        stats.success_rate
    );
    log::info!("Chunks created: {}", stats.total_chunks);
    log::info!("Bytes processed: {}", stats.total_size);
    for error in &stats.errors {
        log::warn!("  {} failed: {}", error.file, error.error);
    }

    Ok(())
}
