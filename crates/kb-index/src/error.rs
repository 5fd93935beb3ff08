use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index backend request failed: {0}")]
    Transient(String),
    #[error("index backend rejected the request: {0}")]
    Permanent(String),
}

impl IndexError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Transient(_))
    }
}
