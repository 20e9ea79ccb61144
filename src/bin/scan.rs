use anyhow::Result;
use clap::Parser;

use kbase::config::Config;
use kbase::db::kb::seed_default_kb;
use kbase::db::sync_roots::{
    create_sync_root, get_all_sync_roots, get_sync_root, NewSyncRoot, SyncMode,
};
use kbase::db::Db;
use kbase::sync::scan_sync_root;

#[derive(Parser, Debug)]
#[command(name = "scan")]
#[command(about = "Register sync roots and run one-shot directory scans")]
struct Args {
    /// Scan a single sync root by id
    #[arg(short, long)]
    root: Option<i64>,

    /// Scan every registered sync root
    #[arg(short, long)]
    all: bool,

    /// Register a new sync root at this path, then scan it
    #[arg(long)]
    register: Option<String>,

    /// Knowledge base id for --register
    #[arg(long, default_value_t = 1)]
    kb: i64,

    /// Sync mode for --register: manual or realtime
    #[arg(long, default_value = "manual")]
    mode: String,

    /// Comma-separated allowed extensions for --register (empty = all supported)
    #[arg(long, default_value = "")]
    file_types: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let db = Db::new(config.db_path());
    db.migrate().await?;
    seed_default_kb(&db).await?;

    if let Some(path) = &args.register {
        let path = std::fs::canonicalize(path)?;
        let root = create_sync_root(
            &db,
            NewSyncRoot {
                kb_id: args.kb,
                dir_path: path.to_string_lossy().to_string(),
                sync_mode: SyncMode::from_str(&args.mode),
                recursive: true,
                ignore_hidden: true,
                ignore_large: true,
                file_types: args.file_types.clone(),
            },
        )
        .await?;
        log::info!("Registered sync root {} at {}", root.id, root.dir_path);

        let summary = scan_sync_root(&db, &root, &config.sync).await?;
        log::info!(
            "Initial scan: {} added, {} updated, {} skipped, {} failed",
            summary.added,
            summary.updated,
            summary.skipped,
            summary.failed
        );
        return Ok(());
    }

    let roots = if let Some(root_id) = args.root {
        match get_sync_root(&db, root_id).await? {
            Some(root) => vec![root],
            None => {
                log::error!("Sync root {} not found", root_id);
                return Ok(());
            }
        }
    } else if args.all {
        get_all_sync_roots(&db).await?
    } else {
        log::error!("Nothing to do: pass --root <id>, --all, or --register <path>");
        return Ok(());
    };

    for root in roots {
        match scan_sync_root(&db, &root, &config.sync).await {
            Ok(summary) => log::info!(
                "Scanned {} (root {}): {} added, {} updated, {} skipped, {} failed",
                root.dir_path,
                root.id,
                summary.added,
                summary.updated,
                summary.skipped,
                summary.failed
            ),
            Err(e) => log::error!("Scan failed for {} (root {}): {}", root.dir_path, root.id, e),
        }
    }

    Ok(())
}
