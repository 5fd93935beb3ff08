//! `Embedder` contract (§4.3.1): an OpenAI-compatible embeddings adapter, and a
//! deterministic local hash-embedding fallback that keeps ingestion runnable
//! with zero external dependencies, the same always-available-default posture
//! the teacher applies to its local-filesystem storage backend.

pub mod error;

use async_trait::async_trait;
pub use error::EmbedError;
use serde::Deserialize;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
    fn dim(&self) -> usize;
}

/// Stable pseudo-embedding derived from `blake3(text)`, expanded to `dim` floats
/// in `[-1, 1]` and L2-normalized. Deterministic and free of network calls.
pub struct LocalHashEmbedder {
    dim: usize,
}

impl LocalHashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dim);
        let mut counter: u32 = 0;
        while out.len() < self.dim {
            let mut hasher = blake3::Hasher::new();
            hasher.update(text.as_bytes());
            hasher.update(&counter.to_le_bytes());
            let hash = hasher.finalize();
            for chunk in hash.as_bytes().chunks(4) {
                if out.len() >= self.dim {
                    break;
                }
                let mut buf = [0u8; 4];
                buf[..chunk.len()].copy_from_slice(chunk);
                let v = u32::from_le_bytes(buf) as f32 / u32::MAX as f32;
                out.push(v * 2.0 - 1.0);
            }
            counter += 1;
        }
        l2_normalize(&mut out);
        out
    }
}

#[async_trait]
impl Embedder for LocalHashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingItem {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
}

impl OpenAiEmbedder {
    pub fn new(base_url: String, api_key: String, model: String, dim: usize) -> Self {
        Self { client: reqwest::Client::new(), base_url, api_key, model, dim }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|e| EmbedError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbedError::Transient(format!("embeddings endpoint returned {}", response.status())));
        }

        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Transient(e.to_string()))?;

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            if item.embedding.len() != self.dim {
                return Err(EmbedError::DimensionMismatch { expected: self.dim, got: item.embedding.len() });
            }
            vectors.push(item.embedding);
        }
        Ok(vectors)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_embedder_is_deterministic() {
        let embedder = LocalHashEmbedder::new(32);
        let a = embedder.embed_documents(&["hello".to_string()]).await.unwrap();
        let b = embedder.embed_documents(&["hello".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 32);
    }

    #[tokio::test]
    async fn local_embedder_varies_by_text() {
        let embedder = LocalHashEmbedder::new(16);
        let a = embedder.embed_documents(&["hello".to_string()]).await.unwrap();
        let b = embedder.embed_documents(&["world".to_string()]).await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn l2_normalize_yields_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
