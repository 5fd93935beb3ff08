//! In-process BM25 `TextIndex`, the default when `ES_ENABLED=false` (§4.7.1).
//! Classic term-frequency scoring, k1=1.2, b=0.75.

use crate::error::IndexError;
use crate::traits::{ScoredHit, TextDoc, TextIndex};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

const K1: f32 = 1.2;
const B: f32 = 0.75;

struct Doc {
    document_id: i64,
    index_version: i64,
    terms: Vec<String>,
}

#[derive(Default)]
struct SpaceIndex {
    docs: HashMap<String, Doc>,
}

impl SpaceIndex {
    fn avg_doc_len(&self) -> f32 {
        if self.docs.is_empty() {
            return 0.0;
        }
        self.docs.values().map(|d| d.terms.len() as f32).sum::<f32>() / self.docs.len() as f32
    }

    fn doc_freq(&self, term: &str) -> usize {
        self.docs.values().filter(|d| d.terms.iter().any(|t| t == term)).count()
    }

    fn term_freq(doc: &Doc, term: &str) -> usize {
        doc.terms.iter().filter(|t| *t == term).count()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

#[derive(Default)]
pub struct InMemoryBm25Index {
    spaces: Mutex<HashMap<String, SpaceIndex>>,
}

impl InMemoryBm25Index {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TextIndex for InMemoryBm25Index {
    async fn upsert(&self, space: &str, docs: Vec<TextDoc>) -> Result<(), IndexError> {
        let mut spaces = self.spaces.lock().unwrap();
        let index = spaces.entry(space.to_string()).or_default();
        for doc in docs {
            index.docs.insert(
                doc.chunk_id,
                Doc { document_id: doc.document_id, index_version: doc.index_version, terms: tokenize(&doc.content) },
            );
        }
        Ok(())
    }

    async fn search(&self, space: &str, query: &str, top_k: usize) -> Result<Vec<ScoredHit>, IndexError> {
        let spaces = self.spaces.lock().unwrap();
        let Some(index) = spaces.get(space) else { return Ok(Vec::new()) };
        let query_terms = tokenize(query);
        let n = index.docs.len() as f32;
        let avg_len = index.avg_doc_len();

        let mut hits: Vec<ScoredHit> = index
            .docs
            .iter()
            .map(|(chunk_id, doc)| {
                let mut score = 0.0f32;
                for term in &query_terms {
                    let df = index.doc_freq(term) as f32;
                    if df == 0.0 {
                        continue;
                    }
                    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                    let tf = SpaceIndex::term_freq(doc, term) as f32;
                    let len_norm = 1.0 - B + B * (doc.terms.len() as f32 / avg_len.max(1.0));
                    score += idf * (tf * (K1 + 1.0)) / (tf + K1 * len_norm);
                }
                ScoredHit { chunk_id: chunk_id.clone(), score }
            })
            .filter(|h| h.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_by_document(&self, space: &str, document_id: i64, keep_index_version: i64) -> Result<(), IndexError> {
        let mut spaces = self.spaces.lock().unwrap();
        if let Some(index) = spaces.get_mut(space) {
            index.docs.retain(|_, d| !(d.document_id == document_id && d.index_version != keep_index_version));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_finds_matching_term() {
        let index = InMemoryBm25Index::new();
        index
            .upsert(
                "default",
                vec![
                    TextDoc { chunk_id: "a".into(), document_id: 1, index_version: 1, content: "Hello world.".into() },
                    TextDoc { chunk_id: "b".into(), document_id: 1, index_version: 1, content: "Second paragraph.".into() },
                ],
            )
            .await
            .unwrap();

        let hits = index.search("default", "Hello", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn unmatched_query_returns_empty() {
        let index = InMemoryBm25Index::new();
        index
            .upsert("default", vec![TextDoc { chunk_id: "a".into(), document_id: 1, index_version: 1, content: "abc".into() }])
            .await
            .unwrap();
        let hits = index.search("default", "zzz", 10).await.unwrap();
        assert!(hits.is_empty());
    }
}
