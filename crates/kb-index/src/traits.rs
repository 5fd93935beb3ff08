//! `VectorIndex` / `TextIndex` (§4.7): per-space adapters keyed by `chunk_id`.

use crate::error::IndexError;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct VectorDoc {
    pub chunk_id: String,
    pub document_id: i64,
    pub index_version: i64,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct TextDoc {
    pub chunk_id: String,
    pub document_id: i64,
    pub index_version: i64,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub chunk_id: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, space: &str, docs: Vec<VectorDoc>) -> Result<(), IndexError>;
    async fn search(&self, space: &str, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredHit>, IndexError>;
    async fn delete_by_document(&self, space: &str, document_id: i64, keep_index_version: i64) -> Result<(), IndexError>;
}

#[async_trait]
pub trait TextIndex: Send + Sync {
    async fn upsert(&self, space: &str, docs: Vec<TextDoc>) -> Result<(), IndexError>;
    async fn search(&self, space: &str, query: &str, top_k: usize) -> Result<Vec<ScoredHit>, IndexError>;
    async fn delete_by_document(&self, space: &str, document_id: i64, keep_index_version: i64) -> Result<(), IndexError>;
}
