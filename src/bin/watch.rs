use anyhow::Result;
use clap::Parser;

use kbase::config::Config;
use kbase::db::sync_roots::get_sync_root;
use kbase::db::Db;
use kbase::sync::{run_watcher, scan_sync_root};

#[derive(Parser, Debug)]
#[command(name = "watch")]
#[command(about = "Run a realtime filesystem watcher for one sync root")]
struct Args {
    /// Sync root id to watch
    #[arg(short, long)]
    root: i64,

    /// Skip the initial catch-up scan
    #[arg(long)]
    no_initial_scan: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let db = Db::new(config.db_path());
    db.migrate().await?;

    let root = get_sync_root(&db, args.root)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Sync root {} not found", args.root))?;

    if !args.no_initial_scan {
        let summary = scan_sync_root(&db, &root, &config.sync).await?;
        log::info!(
            "Catch-up scan: {} added, {} updated, {} skipped",
            summary.added,
            summary.updated,
            summary.skipped
        );
    }

    // Runs until the process is killed
    run_watcher(db, root, config.sync.clone()).await?;
    Ok(())
}
