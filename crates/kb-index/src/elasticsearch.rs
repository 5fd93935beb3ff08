//! Elasticsearch-backed `TextIndex` (§4.7.1), gated behind `ES_ENABLED`. Plain
//! HTTP against `_bulk`/`_search`, not the official client, matching the
//! teacher's preference for `reqwest` everywhere it already talks HTTP.

use crate::error::IndexError;
use crate::traits::{ScoredHit, TextDoc, TextIndex};
use async_trait::async_trait;
use serde_json::Value;

pub struct ElasticsearchTextIndex {
    client: reqwest::Client,
    base_url: String,
    index_prefix: String,
}

impl ElasticsearchTextIndex {
    pub fn new(scheme: &str, host: &str, port: u16, index_prefix: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{scheme}://{host}:{port}"),
            index_prefix: index_prefix.to_string(),
        }
    }

    fn index_name(&self, space: &str) -> String {
        format!("{}-{}", self.index_prefix, space)
    }
}

#[async_trait]
impl TextIndex for ElasticsearchTextIndex {
    async fn upsert(&self, space: &str, docs: Vec<TextDoc>) -> Result<(), IndexError> {
        let index = self.index_name(space);
        let mut body = String::new();
        for doc in &docs {
            body.push_str(&serde_json::to_string(&serde_json::json!({"index": {"_index": index, "_id": doc.chunk_id}})).unwrap());
            body.push('\n');
            body.push_str(
                &serde_json::to_string(&serde_json::json!({
                    "document_id": doc.document_id,
                    "index_version": doc.index_version,
                    "content": doc.content,
                }))
                .unwrap(),
            );
            body.push('\n');
        }

        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| IndexError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IndexError::Transient(format!("ES _bulk returned {}", response.status())));
        }
        Ok(())
    }

    async fn search(&self, space: &str, query: &str, top_k: usize) -> Result<Vec<ScoredHit>, IndexError> {
        let index = self.index_name(space);
        let response = self
            .client
            .post(format!("{}/{}/_search", self.base_url, index))
            .json(&serde_json::json!({
                "size": top_k,
                "query": { "match": { "content": query } }
            }))
            .send()
            .await
            .map_err(|e| IndexError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IndexError::Transient(format!("ES _search returned {}", response.status())));
        }

        let body: Value = response.json().await.map_err(|e| IndexError::Transient(e.to_string()))?;
        let hits = body["hits"]["hits"].as_array().cloned().unwrap_or_default();
        Ok(hits
            .into_iter()
            .filter_map(|h| {
                let chunk_id = h["_id"].as_str()?.to_string();
                let score = h["_score"].as_f64().unwrap_or(0.0) as f32;
                Some(ScoredHit { chunk_id, score })
            })
            .collect())
    }

    async fn delete_by_document(&self, space: &str, document_id: i64, keep_index_version: i64) -> Result<(), IndexError> {
        let index = self.index_name(space);
        let response = self
            .client
            .post(format!("{}/{}/_delete_by_query", self.base_url, index))
            .json(&serde_json::json!({
                "query": {
                    "bool": {
                        "must": [{"term": {"document_id": document_id}}],
                        "must_not": [{"term": {"index_version": keep_index_version}}]
                    }
                }
            }))
            .send()
            .await
            .map_err(|e| IndexError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IndexError::Transient(format!("ES _delete_by_query returned {}", response.status())));
        }
        Ok(())
    }
}
