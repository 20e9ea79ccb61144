use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params;

use crate::db::Db;
use crate::error::{KbaseError, Result};
use crate::vector::{Embedder, VectorDocument, VectorHit, VectorStore};

/// Sqlite-backed vector store: embeddings are stored as little-endian f32
/// BLOBs and scored in process with cosine similarity. Logical tables share
/// one physical table, discriminated by the `table_name` column.
pub struct LocalVectorStore {
    db: Db,
    embedder: Arc<dyn Embedder>,
}

impl LocalVectorStore {
    pub fn new(db: Db, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }
}

/// Encode an embedding as raw little-endian bytes
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Parse an embedding BLOB back to floats. None on a malformed length.
fn parse_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}

/// Cosine similarity; 0.0 when either vector has zero magnitude
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn add_documents(&self, table: &str, documents: Vec<VectorDocument>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(texts).await?;
        if embeddings.len() != documents.len() {
            return Err(KbaseError::Embedding(format!(
                "Embedding count mismatch: {} documents, {} vectors",
                documents.len(),
                embeddings.len()
            )));
        }

        let table = table.to_string();
        let count = self
            .db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO vector_entries (table_name, file_id, content, metadata, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for (doc, embedding) in documents.iter().zip(embeddings.iter()) {
                        stmt.execute(params![
                            table,
                            doc.file_id,
                            doc.content,
                            doc.metadata.to_string(),
                            encode_embedding(embedding),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(documents.len())
            })
            .await?;

        Ok(count)
    }

    async fn similarity_search_with_score(
        &self,
        table: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<(VectorHit, f32)>> {
        let query_vec = self.embedder.embed_query(query).await?;

        let table = table.to_string();
        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT content, file_id, metadata, embedding
                     FROM vector_entries WHERE table_name = ?1 AND embedding IS NOT NULL",
                )?;
                let rows = stmt.query_map(params![table], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                    ))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok::<Vec<_>, KbaseError>(out)
            })
            .await?;

        let mut scored: Vec<(f32, VectorHit)> = Vec::new();
        for (content, file_id, metadata, blob) in rows {
            let embedding = match parse_embedding(&blob) {
                Some(e) => e,
                None => continue,
            };
            let score = cosine_similarity(&query_vec, &embedding);
            let metadata = metadata
                .and_then(|m| serde_json::from_str(&m).ok())
                .unwrap_or(serde_json::Value::Null);
            scored.push((
                score,
                VectorHit {
                    content,
                    file_id,
                    metadata,
                },
            ));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, hit)| (hit, score))
            .collect())
    }

    async fn delete_by_file_ids(&self, table: &str, file_ids: &[i64]) -> Result<usize> {
        if file_ids.is_empty() {
            return Ok(0);
        }
        let table = table.to_string();
        let ids = file_ids.to_vec();
        self.db
            .with_connection(move |conn| {
                let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!(
                    "DELETE FROM vector_entries WHERE table_name = ? AND file_id IN ({})",
                    placeholders
                );
                let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(table.clone())];
                for id in &ids {
                    params.push(Box::new(*id));
                }
                let count = conn.execute(&sql, rusqlite::params_from_iter(params))?;
                Ok(count)
            })
            .await
    }

    async fn count_rows(&self, table: &str) -> Result<usize> {
        let table = table.to_string();
        self.db
            .with_connection(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM vector_entries WHERE table_name = ?1",
                    params![table],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
    }

    async fn count_rows_for_file(&self, table: &str, file_id: i64) -> Result<usize> {
        let table = table.to_string();
        self.db
            .with_connection(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM vector_entries WHERE table_name = ?1 AND file_id = ?2",
                    params![table, file_id],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
    }
}
