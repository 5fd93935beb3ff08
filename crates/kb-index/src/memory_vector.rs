//! Brute-force cosine-similarity `VectorIndex` over an in-memory map. The
//! always-available default, and the backend the in-memory test suite runs
//! against (§4.7.1).

use crate::error::IndexError;
use crate::traits::{ScoredHit, VectorDoc, VectorIndex};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

struct Entry {
    document_id: i64,
    index_version: i64,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
    spaces: Mutex<HashMap<String, HashMap<String, Entry>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, space: &str, docs: Vec<VectorDoc>) -> Result<(), IndexError> {
        let mut spaces = self.spaces.lock().unwrap();
        let entries = spaces.entry(space.to_string()).or_default();
        for doc in docs {
            entries.insert(
                doc.chunk_id,
                Entry { document_id: doc.document_id, index_version: doc.index_version, vector: doc.vector },
            );
        }
        Ok(())
    }

    async fn search(&self, space: &str, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredHit>, IndexError> {
        let spaces = self.spaces.lock().unwrap();
        let mut hits: Vec<ScoredHit> = match spaces.get(space) {
            Some(entries) => entries
                .iter()
                .map(|(chunk_id, entry)| ScoredHit { chunk_id: chunk_id.clone(), score: cosine(query_vector, &entry.vector) })
                .collect(),
            None => Vec::new(),
        };
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_by_document(&self, space: &str, document_id: i64, keep_index_version: i64) -> Result<(), IndexError> {
        let mut spaces = self.spaces.lock().unwrap();
        if let Some(entries) = spaces.get_mut(space) {
            entries.retain(|_, e| !(e.document_id == document_id && e.index_version != keep_index_version));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(
                "default",
                vec![
                    VectorDoc { chunk_id: "a".into(), document_id: 1, index_version: 1, vector: vec![1.0, 0.0] },
                    VectorDoc { chunk_id: "b".into(), document_id: 1, index_version: 1, vector: vec![0.0, 1.0] },
                ],
            )
            .await
            .unwrap();

        let hits = index.search("default", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn delete_by_document_keeps_only_active_version() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(
                "default",
                vec![
                    VectorDoc { chunk_id: "old".into(), document_id: 1, index_version: 1, vector: vec![1.0, 0.0] },
                    VectorDoc { chunk_id: "new".into(), document_id: 1, index_version: 2, vector: vec![1.0, 0.0] },
                ],
            )
            .await
            .unwrap();
        index.delete_by_document("default", 1, 2).await.unwrap();
        let hits = index.search("default", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "new");
    }
}
