//! Transport-layer error mapping for the minimal axum shim (§2.1). Grounded in
//! `orbit-web`'s `WebError`: one enum, one `IntoResponse` impl, JSON body shaped
//! `{"error": ..., "status": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("space {0} does not exist or is disabled")]
    SpaceDisabled(String),
    #[error("job store error: {0}")]
    JobStore(#[from] kb_jobstore::JobStoreError),
    #[error("storage backend error: {0}")]
    Storage(#[from] kb_storage::StorageBackendError),
    #[error("embed error: {0}")]
    Embed(#[from] kb_embed::EmbedError),
    #[error("retrieval error: {0}")]
    Retrieval(#[from] kb_retrieval::RetrievalError),
    #[error("callback error: {0}")]
    Callback(#[from] kb_voc::CallbackError),
    #[error("multipart error: {0}")]
    Multipart(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::SpaceDisabled(_) => StatusCode::FORBIDDEN,
            ApiError::JobStore(e) => match e {
                kb_jobstore::JobStoreError::NotFound(_) => StatusCode::NOT_FOUND,
                kb_jobstore::JobStoreError::Constraint(_) => StatusCode::BAD_REQUEST,
                kb_jobstore::JobStoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Callback(kb_voc::CallbackError::TokenMismatch) => StatusCode::UNAUTHORIZED,
            ApiError::Callback(kb_voc::CallbackError::UnknownTask) => StatusCode::NOT_FOUND,
            ApiError::Callback(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) | ApiError::Embed(_) | ApiError::Retrieval(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
