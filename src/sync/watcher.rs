//! Realtime watcher: notify thread with debounce, async event loop that
//! applies the scanner's reconcile logic per file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::{EventKind, RecursiveMode, Watcher};

use crate::config::SyncConfig;
use crate::db::chunks::delete_chunks_for_file;
use crate::db::files::{self, delete_file_row};
use crate::db::sync_logs::{create_sync_log, finalize_sync_log, SyncLogStatus};
use crate::db::sync_roots::SyncRoot;
use crate::db::Db;
use crate::error::{KbaseError, Result};
use crate::sync::scanner::{passes_filters, reconcile_file, ReconcileOutcome};

/// Filesystem change classes the watcher reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Added,
    Changed,
    Removed,
}

/// Run the watcher thread: watch `root`, debounce events, and send
/// `(kind, path)` pairs over `tx`. The thread exits when the receiver is
/// dropped or on a watcher setup error.
pub fn run_watcher_thread(
    root: &Path,
    debounce_ms: u64,
    tx: mpsc::Sender<(WatchEventKind, PathBuf)>,
) -> Result<()> {
    let root = root.to_path_buf();
    let debounce = Duration::from_millis(debounce_ms);

    let (event_tx, event_rx) = mpsc::channel::<(WatchEventKind, Vec<PathBuf>)>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(ev) = res {
            let kind = match ev.kind {
                EventKind::Create(_) => WatchEventKind::Added,
                EventKind::Modify(_) => WatchEventKind::Changed,
                EventKind::Remove(_) => WatchEventKind::Removed,
                _ => return,
            };
            let _ = event_tx.send((kind, ev.paths));
        }
    })
    .map_err(|e| KbaseError::Config(e.to_string()))?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| KbaseError::Config(e.to_string()))?;

    // Debounce: the latest event kind per path wins
    let mut pending: HashMap<PathBuf, (WatchEventKind, Instant)> = HashMap::new();

    loop {
        match event_rx.recv_timeout(debounce) {
            Ok((kind, paths)) => {
                let now = Instant::now();
                for p in paths {
                    pending.insert(p, (kind, now));
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                let ready: Vec<_> = pending
                    .iter()
                    .filter(|(_, (_, t))| now.duration_since(*t) >= debounce)
                    .map(|(p, (k, _))| (*k, p.clone()))
                    .collect();
                for (_, p) in &ready {
                    pending.remove(p);
                }
                for (kind, p) in ready {
                    if tx.send((kind, p)).is_err() {
                        return Ok(());
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

/// Handle one debounced filesystem event for a sync root.
///
/// Add/change runs the same upsert as the scanner, wrapped in its own
/// SyncLog. Unlink removes chunk rows and the file record; vector-store
/// cleanup is deliberately left to the explicit deletion paths.
pub async fn handle_event(
    db: &Db,
    root: &SyncRoot,
    sync_cfg: &SyncConfig,
    kind: WatchEventKind,
    path: &Path,
) -> Result<()> {
    match kind {
        WatchEventKind::Added | WatchEventKind::Changed => {
            if !path.is_file() {
                return Ok(());
            }
            let size = std::fs::metadata(path)?.len();
            if !passes_filters(root, sync_cfg, path, size) {
                return Ok(());
            }

            let log_id = create_sync_log(db, root.id, root.kb_id).await?;
            match reconcile_file(db, root, path, None).await {
                Ok(outcome) => {
                    let synced = match outcome {
                        ReconcileOutcome::Skipped => 0,
                        _ => 1,
                    };
                    finalize_sync_log(
                        db,
                        log_id,
                        SyncLogStatus::Success,
                        1,
                        synced,
                        0,
                        Some("Sync completed".to_string()),
                    )
                    .await?;
                }
                Err(e) => {
                    finalize_sync_log(
                        db,
                        log_id,
                        SyncLogStatus::Failed,
                        1,
                        0,
                        1,
                        Some(e.to_string()),
                    )
                    .await?;
                    return Err(e);
                }
            }
        }
        WatchEventKind::Removed => {
            if root.ignore_hidden && crate::sync::is_hidden_or_temp(path) {
                return Ok(());
            }
            let path_str = path.to_string_lossy().to_string();
            let record = match files::find_by_path(db, &path_str, root.id).await? {
                Some(record) => record,
                None => return Ok(()),
            };

            let log_id = create_sync_log(db, root.id, root.kb_id).await?;
            let chunks_removed = delete_chunks_for_file(db, record.id).await?;
            delete_file_row(db, record.id).await?;
            finalize_sync_log(
                db,
                log_id,
                SyncLogStatus::Success,
                1,
                1,
                0,
                Some(format!(
                    "Removed deleted file ({} chunks): {}",
                    chunks_removed, path_str
                )),
            )
            .await?;
            log::info!("Removed deleted file: {}", path_str);
        }
    }
    Ok(())
}

/// Run the realtime watcher for one sync root until the watcher thread exits.
///
/// Each event is handled independently; a failing file is logged and never
/// brings the loop down.
pub async fn run_watcher(db: Db, root: SyncRoot, sync_cfg: SyncConfig) -> Result<()> {
    let watch_path = PathBuf::from(&root.dir_path);
    let debounce_ms = sync_cfg.debounce_ms;
    let (tx, rx) = mpsc::channel();
    let rx = Arc::new(Mutex::new(rx));

    std::thread::spawn(move || {
        if let Err(e) = run_watcher_thread(&watch_path, debounce_ms, tx) {
            log::error!("watcher thread error: {}", e);
        }
    });

    log::info!("Watching {} (sync root {})", root.dir_path, root.id);

    loop {
        let rx_clone = rx.clone();
        let event = tokio::task::spawn_blocking(move || rx_clone.lock().unwrap().recv())
            .await
            .map_err(|e| KbaseError::Config(format!("watcher task join: {}", e)))?;

        let (kind, path) = match event {
            Ok(ev) => ev,
            Err(_) => break,
        };

        if let Err(e) = handle_event(&db, &root, &sync_cfg, kind, &path).await {
            log::error!("watch event {:?} {}: {}", kind, path.display(), e);
        }
    }
    Ok(())
}
