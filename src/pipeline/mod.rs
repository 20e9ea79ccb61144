//! Ingestion pipeline: the per-file status state machine, the interval-driven
//! background processor, and cascading deletion.

pub mod delete;
pub mod orchestrator;
pub mod processor;

pub use delete::{delete_file, delete_knowledge_base, delete_sync_root, DeletionReport};
pub use orchestrator::{
    get_processing_stats, process_file, process_files, process_pending_files,
    reprocess_failed_files, ProcessOutcome, ProcessingStats,
};
pub use processor::TaskProcessor;
