//! Milvus-backed `VectorIndex` (§4.7.1), gated behind `MILVUS_ENABLED`. Speaks
//! Milvus's documented REST v2 API over `reqwest`, rather than vendoring a
//! hand-written gRPC/protobuf stub without the real upstream `.proto` files.

use crate::error::IndexError;
use crate::traits::{ScoredHit, VectorDoc, VectorIndex};
use async_trait::async_trait;
use serde_json::Value;

pub struct MilvusVectorIndex {
    client: reqwest::Client,
    base_url: String,
    collection_prefix: String,
    database: String,
}

impl MilvusVectorIndex {
    pub fn new(uri: &str, database: &str, collection_prefix: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: uri.trim_end_matches('/').to_string(),
            collection_prefix: collection_prefix.to_string(),
            database: database.to_string(),
        }
    }

    fn collection_name(&self, space: &str) -> String {
        format!("{}_{}", self.collection_prefix, space)
    }
}

#[async_trait]
impl VectorIndex for MilvusVectorIndex {
    async fn upsert(&self, space: &str, docs: Vec<VectorDoc>) -> Result<(), IndexError> {
        let rows: Vec<Value> = docs
            .iter()
            .map(|d| {
                serde_json::json!({
                    "chunk_id": d.chunk_id,
                    "document_id": d.document_id,
                    "index_version": d.index_version,
                    "vector": d.vector,
                })
            })
            .collect();

        let response = self
            .client
            .post(format!("{}/v2/vectordb/entities/upsert", self.base_url))
            .json(&serde_json::json!({
                "collectionName": self.collection_name(space),
                "dbName": self.database,
                "data": rows,
            }))
            .send()
            .await
            .map_err(|e| IndexError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IndexError::Transient(format!("Milvus upsert returned {}", response.status())));
        }
        Ok(())
    }

    async fn search(&self, space: &str, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredHit>, IndexError> {
        let response = self
            .client
            .post(format!("{}/v2/vectordb/entities/search", self.base_url))
            .json(&serde_json::json!({
                "collectionName": self.collection_name(space),
                "dbName": self.database,
                "data": [query_vector],
                "limit": top_k,
                "outputFields": ["chunk_id"],
            }))
            .send()
            .await
            .map_err(|e| IndexError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IndexError::Transient(format!("Milvus search returned {}", response.status())));
        }

        let body: Value = response.json().await.map_err(|e| IndexError::Transient(e.to_string()))?;
        let rows = body["data"].as_array().cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let chunk_id = row["chunk_id"].as_str()?.to_string();
                let score = row["distance"].as_f64().unwrap_or(0.0) as f32;
                Some(ScoredHit { chunk_id, score })
            })
            .collect())
    }

    async fn delete_by_document(&self, space: &str, document_id: i64, keep_index_version: i64) -> Result<(), IndexError> {
        let filter = format!("document_id == {document_id} && index_version != {keep_index_version}");
        let response = self
            .client
            .post(format!("{}/v2/vectordb/entities/delete", self.base_url))
            .json(&serde_json::json!({
                "collectionName": self.collection_name(space),
                "dbName": self.database,
                "filter": filter,
            }))
            .send()
            .await
            .map_err(|e| IndexError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IndexError::Transient(format!("Milvus delete returned {}", response.status())));
        }
        Ok(())
    }
}
