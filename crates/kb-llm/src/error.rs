use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("llm backend request failed: {0}")]
    Transient(String),
    #[error("llm backend rejected the request: {0}")]
    Permanent(String),
}
