//! Hybrid Retriever (§4.6): fetches candidates from the backends enabled for a
//! space, fuses them, resolves to searchable chunks, and enforces a
//! per-document diversity cap.

pub mod error;
pub mod fusion;

pub use error::RetrievalError;
use fusion::{reciprocal_rank_fusion, sort_single_backend, RRF_K};
use kb_core::entities::Chunk;
use kb_index::{TextIndex, VectorIndex};
use kb_jobstore::JobStore;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Vector,
    Bm25,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub chunk_id: String,
    pub document_id: i64,
    pub space_code: String,
    pub index_version: i64,
    pub content: String,
    pub score: f32,
}

pub struct Retriever {
    job_store: Arc<dyn JobStore>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    text_index: Option<Arc<dyn TextIndex>>,
    max_per_doc: usize,
}

impl Retriever {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        vector_index: Option<Arc<dyn VectorIndex>>,
        text_index: Option<Arc<dyn TextIndex>>,
        max_per_doc: usize,
    ) -> Self {
        Self { job_store, vector_index, text_index, max_per_doc }
    }

    pub async fn search(
        &self,
        space: &str,
        query: &str,
        query_vector: Option<&[f32]>,
        top_k: usize,
        backend: SearchBackend,
    ) -> Result<Vec<Hit>, RetrievalError> {
        let fetch_k = top_k * 5;
        let want_vector = matches!(backend, SearchBackend::Vector | SearchBackend::Hybrid) && self.vector_index.is_some();
        let want_text = matches!(backend, SearchBackend::Bm25 | SearchBackend::Hybrid) && self.text_index.is_some();

        if !want_vector && !want_text {
            return Err(RetrievalError::NoBackendEnabled);
        }

        let vector_hits = if want_vector {
            let index = self.vector_index.as_ref().unwrap();
            let vector = query_vector.unwrap_or(&[]);
            index.search(space, vector, fetch_k).await?
        } else {
            Vec::new()
        };

        let text_hits = if want_text {
            self.text_index.as_ref().unwrap().search(space, query, fetch_k).await?
        } else {
            Vec::new()
        };

        let fused = match backend {
            SearchBackend::Vector => sort_single_backend(&vector_hits),
            SearchBackend::Bm25 => sort_single_backend(&text_hits),
            SearchBackend::Hybrid => {
                if want_vector && want_text {
                    reciprocal_rank_fusion(&[vector_hits, text_hits], RRF_K)
                } else if want_vector {
                    sort_single_backend(&vector_hits)
                } else {
                    sort_single_backend(&text_hits)
                }
            }
        };

        let chunk_ids: Vec<String> = fused.iter().map(|f| f.chunk_id.clone()).collect();
        let chunks = self.job_store.list_searchable_chunks(space, &chunk_ids).await?;
        let chunk_by_id: HashMap<String, Chunk> = chunks.into_iter().map(|c| (c.chunk_id.clone(), c)).collect();

        let mut per_doc_count: HashMap<i64, usize> = HashMap::new();
        let mut hits = Vec::with_capacity(top_k);
        for f in fused {
            let Some(chunk) = chunk_by_id.get(&f.chunk_id) else { continue };
            let count = per_doc_count.entry(chunk.document_id).or_insert(0);
            if *count >= self.max_per_doc {
                continue;
            }
            *count += 1;
            hits.push(Hit {
                chunk_id: chunk.chunk_id.clone(),
                document_id: chunk.document_id,
                space_code: chunk.space_code.clone(),
                index_version: chunk.index_version,
                content: chunk.content.clone(),
                score: f.score,
            });
            if hits.len() >= top_k {
                break;
            }
        }
        Ok(hits)
    }
}
