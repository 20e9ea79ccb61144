use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ProcessingConfig;
use crate::db::Db;
use crate::error::Result;
use crate::loader::ExtractorRegistry;
use crate::pipeline::orchestrator::{
    process_pending_files, reprocess_failed_files, ProcessingStats,
};
use crate::vector::VectorStore;

/// Background task processor.
///
/// Owns its database and vector-store handles plus a running flag as an
/// explicit context object: created at process start, stopped at shutdown,
/// no module-global state. Each tick fetches up to `fetch_batch_size` PENDING
/// files and runs them through the orchestrator with bounded concurrency;
/// a failing tick is logged and never stops the loop.
pub struct TaskProcessor {
    inner: Arc<Inner>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

struct Inner {
    db: Db,
    vector: Arc<dyn VectorStore>,
    registry: ExtractorRegistry,
    config: ProcessingConfig,
    running: AtomicBool,
}

impl TaskProcessor {
    pub fn new(db: Db, vector: Arc<dyn VectorStore>, config: ProcessingConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                vector,
                registry: ExtractorRegistry::new(),
                config,
                running: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start the interval loop. Starting twice is a no-op that logs and
    /// returns.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            log::info!("Task processor is already running");
            return;
        }

        log::info!(
            "Starting document processing task (interval {}ms, batch {})",
            self.inner.config.interval_ms,
            self.inner.config.fetch_batch_size
        );

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let interval = Duration::from_millis(inner.config.interval_ms.max(1));
            loop {
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                match process_pending_files(
                    &inner.db,
                    inner.vector.as_ref(),
                    &inner.registry,
                    &inner.config,
                    inner.config.fetch_batch_size,
                )
                .await
                {
                    Ok(stats) if stats.total_files > 0 => {
                        log::info!(
                            "Processing tick: {} ok, {} failed",
                            stats.successful_files,
                            stats.failed_files
                        );
                    }
                    Ok(_) => log::debug!("Processing tick: no pending files"),
                    Err(e) => log::error!("Processing tick failed: {}", e),
                }
                tokio::time::sleep(interval).await;
            }
            log::info!("Document processing task stopped");
        });

        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Stop the interval loop. Stopping an idle processor logs and returns.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            log::info!("Task processor is not running");
            return;
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
        log::info!("Stopped document processing task");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run one processing pass immediately, outside the interval loop
    pub async fn process_once(&self, limit: usize) -> Result<ProcessingStats> {
        process_pending_files(
            &self.inner.db,
            self.inner.vector.as_ref(),
            &self.inner.registry,
            &self.inner.config,
            limit,
        )
        .await
    }

    /// Reset failed files to PENDING and replay them
    pub async fn reprocess_failed(&self, limit: usize) -> Result<ProcessingStats> {
        reprocess_failed_files(
            &self.inner.db,
            self.inner.vector.as_ref(),
            &self.inner.registry,
            &self.inner.config,
            limit,
        )
        .await
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}
