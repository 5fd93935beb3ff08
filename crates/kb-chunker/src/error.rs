use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported modality for content-type {0:?} / extension {1:?}")]
    UnsupportedModality(Option<String>, Option<String>),
    #[error("content could not be decoded as text")]
    UndecodableText,
    #[error("upstream parser backend error: {0}")]
    Upstream(String),
    #[error("malformed document: {0}")]
    Malformed(String),
}

impl ParseError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ParseError::Upstream(_))
    }
}

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("parser produced no chunkable content")]
    Empty,
}
