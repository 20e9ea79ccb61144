//! Vector store contract and the local implementation backing it.
//!
//! The pipeline only relies on the narrow contract below: one logical table
//! per knowledge base (named `kb_<id>`), adding chunk documents tagged with a
//! file id, similarity search, exact-match deletion by file id, and row
//! counting.

pub mod cache;
pub mod embedder;
pub mod store;

pub use cache::EmbeddingCache;
pub use embedder::{Embedder, HttpEmbedder};
pub use store::LocalVectorStore;

use async_trait::async_trait;

use crate::error::Result;

/// One chunk handed to the vector store for indexing
#[derive(Debug, Clone)]
pub struct VectorDocument {
    pub content: String,
    pub file_id: i64,
    pub metadata: serde_json::Value,
}

/// One indexed chunk returned from a similarity search
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub content: String,
    pub file_id: i64,
    pub metadata: serde_json::Value,
}

/// The similarity-search service contract consumed by the pipeline
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and index documents into a logical table
    async fn add_documents(&self, table: &str, documents: Vec<VectorDocument>) -> Result<usize>;

    /// Top-k most similar chunks with their scores
    async fn similarity_search_with_score(
        &self,
        table: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<(VectorHit, f32)>>;

    /// Delete every entry tagged with one of the given file ids. Returns the
    /// number of rows removed.
    async fn delete_by_file_ids(&self, table: &str, file_ids: &[i64]) -> Result<usize>;

    /// Total rows in a logical table
    async fn count_rows(&self, table: &str) -> Result<usize>;

    /// Rows tagged with one file id
    async fn count_rows_for_file(&self, table: &str, file_id: i64) -> Result<usize>;
}
