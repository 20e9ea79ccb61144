//! Ingestion orchestrator: drives a single file through
//! PENDING -> PARSING -> PARSED -> CHUNKING -> CHUNKED -> EMBEDDING ->
//! COMPLETED, persisting every transition before the next stage starts.
//!
//! Any stage failure terminates at FAILED; a failure strictly in the
//! vector-store handoff terminates at EMBEDDING_FAILED instead, because it is
//! typically retryable without re-parsing. No stage auto-retries.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;

use crate::config::ProcessingConfig;
use crate::db::chunks::{delete_chunks_for_file, insert_chunks, NewChunk};
use crate::db::files::{self, FileRecord, FileStatus};
use crate::db::kb::vector_table_name;
use crate::db::Db;
use crate::error::{KbaseError, Result};
use crate::loader::ExtractorRegistry;
use crate::splitter::split_units;
use crate::sync::path_extension;
use crate::vector::{VectorDocument, VectorStore};

/// Result of processing one file
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub file_id: i64,
    pub file_name: String,
    pub success: bool,
    pub chunk_count: usize,
    pub file_size: u64,
    pub error: Option<String>,
}

/// Aggregate statistics over one processing batch
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub success_rate: f64,
    pub total_chunks: usize,
    pub total_size: u64,
    pub errors: Vec<ProcessingError>,
}

/// One failed file inside a batch
#[derive(Debug, Clone)]
pub struct ProcessingError {
    pub file: String,
    pub error: String,
}

/// Process one file through the full state machine.
///
/// Never returns an error for a per-file failure: the failure lands on the
/// record (status + message) and in the outcome.
pub async fn process_file(
    db: &Db,
    vector: &dyn VectorStore,
    registry: &ExtractorRegistry,
    config: &ProcessingConfig,
    file: &FileRecord,
) -> ProcessOutcome {
    match run_stages(db, vector, registry, config, file).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = e.to_string();
            if let Err(status_err) =
                files::update_status(db, file.id, FileStatus::Failed, Some(message.clone())).await
            {
                log::error!(
                    "Failed to record failure for file {}: {}",
                    file.id,
                    status_err
                );
            }
            ProcessOutcome {
                file_id: file.id,
                file_name: file.name.clone(),
                success: false,
                chunk_count: 0,
                file_size: file.size,
                error: Some(message),
            }
        }
    }
}

async fn run_stages(
    db: &Db,
    vector: &dyn VectorStore,
    registry: &ExtractorRegistry,
    config: &ProcessingConfig,
    file: &FileRecord,
) -> Result<ProcessOutcome> {
    files::update_status(db, file.id, FileStatus::Parsing, None).await?;

    let path = Path::new(&file.path);
    let load = registry.load_document(path)?;
    if !load.is_success() {
        let message = load
            .metadata
            .error
            .unwrap_or_else(|| "Document loading failed".to_string());
        return Err(KbaseError::Extraction(message));
    }

    files::update_status(db, file.id, FileStatus::Parsed, None).await?;
    files::update_extraction_metadata(
        db,
        file.id,
        &load.metadata.mime_type,
        load.metadata.file_size as i64,
    )
    .await?;

    files::update_status(db, file.id, FileStatus::Chunking, None).await?;

    let extension = path_extension(path);
    let drafts = split_units(&load.units, &extension, config);
    let total_chunks = drafts.len();
    let processed_at = Utc::now().to_rfc3339();

    // Partial chunk rows from a prior attempt are never reused; indices
    // restart at 0
    delete_chunks_for_file(db, file.id).await?;

    let rows: Vec<NewChunk> = drafts
        .iter()
        .enumerate()
        .map(|(idx, draft)| {
            let mut metadata = serde_json::json!({
                "pageNumber": draft.unit_number,
                "totalPages": draft.total_units,
                "chunkIndex": idx,
                "totalChunks": total_chunks,
                "originalFile": file.name,
                "processedAt": processed_at,
            });
            if let Some(label) = &draft.label {
                metadata["label"] = serde_json::json!(label);
            }
            NewChunk {
                file_id: file.id,
                chunk_index: idx as i64,
                content: draft.content.clone(),
                metadata,
            }
        })
        .collect();
    insert_chunks(db, rows).await?;

    files::update_status(db, file.id, FileStatus::Chunked, None).await?;

    let table = vector_table_name(file.kb_id);
    files::update_status(db, file.id, FileStatus::Embedding, None).await?;

    let documents: Vec<VectorDocument> = drafts
        .iter()
        .enumerate()
        .map(|(idx, draft)| VectorDocument {
            // Prefix the file name so retrieval sees the source name in
            // context
            content: format!("{}\n{}", file.name, draft.content),
            file_id: file.id,
            metadata: serde_json::json!({
                "fileId": file.id,
                "kbId": file.kb_id,
                "fileName": file.name,
                "filePath": file.path,
                "fileSize": load.metadata.file_size,
                "mimeType": load.metadata.mime_type,
                "pageNumber": draft.unit_number,
                "totalPages": draft.total_units,
                "chunkIndex": idx,
                "totalChunks": total_chunks,
                "processedAt": processed_at,
            }),
        })
        .collect();

    match vector.add_documents(&table, documents).await {
        Ok(_) => {
            files::update_status(db, file.id, FileStatus::Completed, None).await?;
            Ok(ProcessOutcome {
                file_id: file.id,
                file_name: file.name.clone(),
                success: true,
                chunk_count: total_chunks,
                file_size: load.metadata.file_size,
                error: None,
            })
        }
        Err(e) => {
            let message = format!("Embedding failed: {}", e);
            files::update_status(db, file.id, FileStatus::EmbeddingFailed, Some(message.clone()))
                .await?;
            Ok(ProcessOutcome {
                file_id: file.id,
                file_name: file.name.clone(),
                success: false,
                chunk_count: total_chunks,
                file_size: load.metadata.file_size,
                error: Some(message),
            })
        }
    }
}

/// Process a batch of files with bounded concurrency: `max_concurrent` files
/// run in flight per sub-batch, with a short pacing delay between sub-batches.
pub async fn process_files(
    db: &Db,
    vector: &dyn VectorStore,
    registry: &ExtractorRegistry,
    config: &ProcessingConfig,
    batch: &[FileRecord],
) -> Vec<ProcessOutcome> {
    let mut results = Vec::with_capacity(batch.len());
    let concurrency = config.max_concurrent.max(1);

    for sub_batch in batch.chunks(concurrency) {
        let futures = sub_batch
            .iter()
            .map(|file| process_file(db, vector, registry, config, file));
        results.extend(join_all(futures).await);

        if results.len() < batch.len() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
    results
}

/// Fetch PENDING files and process them. Returns aggregate statistics.
pub async fn process_pending_files(
    db: &Db,
    vector: &dyn VectorStore,
    registry: &ExtractorRegistry,
    config: &ProcessingConfig,
    limit: usize,
) -> Result<ProcessingStats> {
    let pending = files::get_pending_files(db, limit).await?;
    if pending.is_empty() {
        return Ok(ProcessingStats::default());
    }
    log::info!("Processing {} pending file(s)", pending.len());
    let results = process_files(db, vector, registry, config, &pending).await;
    Ok(get_processing_stats(&results))
}

/// Reset FAILED and EMBEDDING_FAILED files to PENDING and replay the full
/// pipeline for them.
pub async fn reprocess_failed_files(
    db: &Db,
    vector: &dyn VectorStore,
    registry: &ExtractorRegistry,
    config: &ProcessingConfig,
    limit: usize,
) -> Result<ProcessingStats> {
    let failed = files::get_failed_files(db, limit).await?;
    if failed.is_empty() {
        return Ok(ProcessingStats::default());
    }

    let ids: Vec<i64> = failed.iter().map(|f| f.id).collect();
    files::reset_for_retry(db, &ids).await?;
    log::info!("Reprocessing {} failed file(s)", failed.len());

    let results = process_files(db, vector, registry, config, &failed).await;
    Ok(get_processing_stats(&results))
}

/// Fold batch outcomes into aggregate statistics
pub fn get_processing_stats(results: &[ProcessOutcome]) -> ProcessingStats {
    let successful: Vec<_> = results.iter().filter(|r| r.success).collect();
    let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();

    ProcessingStats {
        total_files: results.len(),
        successful_files: successful.len(),
        failed_files: failed.len(),
        success_rate: if results.is_empty() {
            0.0
        } else {
            successful.len() as f64 / results.len() as f64 * 100.0
        },
        total_chunks: successful.iter().map(|r| r.chunk_count).sum(),
        total_size: successful.iter().map(|r| r.file_size).sum(),
        errors: failed
            .iter()
            .map(|r| ProcessingError {
                file: r.file_name.clone(),
                error: r.error.clone().unwrap_or_default(),
            })
            .collect(),
    }
}
