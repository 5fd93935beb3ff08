//! Handlers for the minimal transport shim (§2.1): document submission, hybrid
//! search, job lookup, and the VOC spider callback. Signatures follow
//! `orbit-web/src/api/jobs.rs`'s `State<AppState>` + extractor convention.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use kb_core::entities::ingest_idempotency_key;
use kb_retrieval::SearchBackend;
use kb_voc::callback::CallbackPayload;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::info;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "kb-server" }))
}

/// `POST /rag/documents`: multipart upload, fields `space_code` and `file`.
/// Uploads the blob, creates the `Document` row, allocates an index version,
/// and enqueues an `IngestJob` for the worker pool to pick up.
pub async fn submit_document(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<Value>> {
    let mut space_code: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut content: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::Multipart(e.to_string()))? {
        match field.name().unwrap_or("") {
            "space_code" => {
                space_code = Some(field.text().await.map_err(|e| ApiError::Multipart(e.to_string()))?);
            }
            "file" => {
                filename = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                content = Some(field.bytes().await.map_err(|e| ApiError::Multipart(e.to_string()))?.to_vec());
            }
            _ => {}
        }
    }

    let space_code = space_code.ok_or_else(|| ApiError::BadRequest("missing space_code field".to_string()))?;
    let content = content.ok_or_else(|| ApiError::BadRequest("missing file field".to_string()))?;
    let filename = filename.unwrap_or_else(|| "upload.bin".to_string());
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    if !state.job_store.is_space_enabled(&space_code).await? {
        return Err(ApiError::SpaceDisabled(space_code));
    }

    let sha256 = {
        let mut hasher = Sha256::new();
        hasher.update(&content);
        hex::encode(hasher.finalize())
    };
    let key = format!("{space_code}/{sha256}-{filename}");
    let storage_uri = state.storage.upload(&key, &content_type, content.clone()).await?;

    let document = state
        .job_store
        .create_document(&space_code, &filename, &content_type, content.len() as i64, &storage_uri, &sha256, None)
        .await?;

    let index_version = state.job_store.allocate_index_version(document.document_id).await?;
    let job = state
        .job_store
        .create_ingest_job(document.document_id, &space_code, state.pipeline_version, index_version, state.max_ingest_retries)
        .await?;

    info!(document_id = document.document_id, job_id = job.job_id, "document submitted for ingest");
    Ok(Json(json!({
        "document_id": document.document_id,
        "job_id": job.job_id,
        "index_version": index_version,
        "idempotency_key": ingest_idempotency_key(document.document_id, state.pipeline_version, index_version),
        "status": document.status,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub space: String,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_backend")]
    pub backend: String,
}

fn default_top_k() -> usize {
    10
}

fn default_backend() -> String {
    "hybrid".to_string()
}

/// `GET /rag/search`: embeds the query (when the chosen backend wants a dense
/// vector) and delegates to `Retriever::search`.
pub async fn search(State(state): State<AppState>, Query(params): Query<SearchQuery>) -> ApiResult<Json<Value>> {
    let backend = match params.backend.as_str() {
        "vector" => SearchBackend::Vector,
        "bm25" => SearchBackend::Bm25,
        "hybrid" => SearchBackend::Hybrid,
        other => return Err(ApiError::BadRequest(format!("unknown backend {other}"))),
    };

    let query_vector = if matches!(backend, SearchBackend::Vector | SearchBackend::Hybrid) {
        Some(state.embedder.embed_documents(&[params.query.clone()]).await?.remove(0))
    } else {
        None
    };

    let hits = state
        .retriever
        .search(&params.space, &params.query, query_vector.as_deref(), params.top_k, backend)
        .await?;

    Ok(Json(json!({ "hits": hits.into_iter().map(|h| json!({
        "chunk_id": h.chunk_id,
        "document_id": h.document_id,
        "space_code": h.space_code,
        "index_version": h.index_version,
        "content": h.content,
        "score": h.score,
    })).collect::<Vec<_>>() })))
}

/// `GET /jobs/{id}`: an ingest job and a VOC job draw from disjoint id spaces
/// in different tables, so this tries `IngestJob` first, then `VocJob`.
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<i64>) -> ApiResult<Json<Value>> {
    if let Some(job) = state.job_store.get_ingest_job(job_id).await? {
        return Ok(Json(json!({ "kind": "ingest", "job": job })));
    }
    if let Some(job) = state.job_store.get_voc_job(job_id).await? {
        return Ok(Json(json!({ "kind": "voc", "job": job })));
    }
    Err(ApiError::NotFound(format!("job {job_id}")))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub token: String,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// `POST /voc/spider/callback/{job_id}` (§4.8, §6).
pub async fn spider_callback(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Query(query): Query<CallbackQuery>,
    Json(payload): Json<CallbackPayload>,
) -> ApiResult<Json<Value>> {
    state.callback_receiver.handle(job_id, &query.token, payload).await?;
    Ok(Json(json!({ "accepted": true })))
}

#[derive(Debug, Deserialize)]
pub struct LegacyCallbackQuery {
    pub job_id: i64,
    pub token: String,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// Legacy `POST /voc/spider/callback`, carrying `job_id` as a query parameter
/// instead of a path segment, preserved for spiders deployed against the
/// pre-path-parameter wire shape (§4.8).
pub async fn spider_callback_legacy(
    State(state): State<AppState>,
    Query(query): Query<LegacyCallbackQuery>,
    Json(payload): Json<CallbackPayload>,
) -> ApiResult<Json<Value>> {
    state.callback_receiver.handle(query.job_id, &query.token, payload).await?;
    Ok(Json(json!({ "accepted": true })))
}
