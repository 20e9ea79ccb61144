use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingsConfig;
use crate::error::{KbaseError, Result};
use crate::vector::cache::EmbeddingCache;

/// Anything that can turn texts into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, same order
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(vec![text.to_string()]).await?;
        if embeddings.is_empty() {
            return Err(KbaseError::Embedding(
                "Empty response from embedding backend".to_string(),
            ));
        }
        Ok(embeddings.remove(0))
    }
}

/// Request body for the Ollama-compatible embed endpoint
#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

/// Response body from the embed endpoint
#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP embedding client for an Ollama-compatible backend
///
/// Splits work into bounded batches, retries 429/5xx responses with
/// exponential backoff, and optionally caches single-text embeddings.
pub struct HttpEmbedder {
    client: Client,
    api_url: String,
    model: String,
    batch_size: usize,
    api_key: Option<String>,
    cache: Option<Arc<EmbeddingCache>>,
}

const MAX_RETRIES: usize = 3;

impl HttpEmbedder {
    /// Create an embedder from configuration
    pub fn from_config(config: &EmbeddingsConfig) -> Self {
        let cache = if config.cache_capacity > 0 {
            Some(Arc::new(EmbeddingCache::new(config.cache_capacity)))
        } else {
            None
        };
        let api_key = config
            .api_key_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok());

        Self::new(
            config.api_url.clone(),
            config.model.clone(),
            config.batch_size,
            api_key,
            cache,
        )
    }

    pub fn new(
        api_url: String,
        model: String,
        batch_size: usize,
        api_key: Option<String>,
        cache: Option<Arc<EmbeddingCache>>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_url,
            model,
            batch_size: batch_size.max(1),
            api_key,
            cache,
        }
    }

    /// One API request for up to `batch_size` texts
    async fn embed_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts,
        };

        let url = format!("{}/api/embed", self.api_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| KbaseError::Embedding(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(KbaseError::Embedding(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }

        let result: EmbedResponse = response
            .json()
            .await
            .map_err(|e| KbaseError::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.embeddings.len() != expected {
            return Err(KbaseError::Embedding(format!(
                "Embedding count mismatch: sent {}, received {}",
                expected,
                result.embeddings.len()
            )));
        }
        Ok(result.embeddings)
    }

    /// One request with retry on rate-limit and server errors
    async fn embed_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.embed_request(texts.clone()).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) if attempt < MAX_RETRIES => {
                    let message = e.to_string();
                    let retryable = ["429", "500", "502", "503", "504"]
                        .iter()
                        .any(|code| message.contains(code));
                    if !retryable {
                        return Err(e);
                    }
                    log::warn!("Embedding retry {}/{} after: {}", attempt + 1, MAX_RETRIES, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embed_with_retry(batch.to_vec()).await?;
            all.extend(embeddings);
        }
        Ok(all)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(text) {
                log::debug!("Embedding cache hit");
                return Ok(cached);
            }
        }

        let mut embeddings = self.embed_with_retry(vec![text.to_string()]).await?;
        if embeddings.is_empty() {
            return Err(KbaseError::Embedding(
                "Empty response from embedding backend".to_string(),
            ));
        }
        let embedding = embeddings.remove(0);

        if let Some(cache) = &self.cache {
            cache.put(text.to_string(), embedding.clone());
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_construction() {
        let embedder = HttpEmbedder::new(
            "http://localhost:11434".to_string(),
            "nomic-embed-text".to_string(),
            16,
            None,
            None,
        );
        assert_eq!(embedder.model, "nomic-embed-text");
        assert_eq!(embedder.batch_size, 16);
    }

    #[test]
    fn test_batch_size_floor() {
        let embedder = HttpEmbedder::new(
            "http://localhost:11434".to_string(),
            "m".to_string(),
            0,
            None,
            None,
        );
        assert_eq!(embedder.batch_size, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        // No request should be issued for an empty batch, so the unreachable
        // URL never matters
        let embedder = HttpEmbedder::new(
            "http://127.0.0.1:1".to_string(),
            "m".to_string(),
            16,
            None,
            None,
        );
        let out = embedder.embed_batch(Vec::new()).await.unwrap();
        assert!(out.is_empty());
    }

    // Live-endpoint behavior is covered indirectly through LocalVectorStore
    // tests, which run against a stub embedder.
}
