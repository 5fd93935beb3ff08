//! Error taxonomy (§7 ERROR HANDLING DESIGN).
//!
//! `CoreError` is the shared vocabulary every `kb-*` crate's own error enum converts
//! into at its boundary (via `#[from]` or an explicit `From` impl), so the scheduler
//! only ever has to reason about one `ErrorKind` axis regardless of which backend
//! raised the error. This mirrors the teacher's `ResilienceError::is_transient` /
//! `is_permanent` / `should_trip_breaker` classification, generalized from "one
//! resilience wrapper" to "every adapter in the workspace".

use thiserror::Error;

/// The classification axis §7 requires every adapter to expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retryable; handled by `LeaseScheduler` retry semantics.
    TransientStorage,
    /// Retryable; parser backend, LLM, or index backend hiccup.
    TransientUpstream,
    /// Not retried: bad format, unsupported modality, empty chunks, etc.
    PermanentInput,
    /// Surfaced as 401/403 at transport boundaries.
    Auth,
    /// Surfaced as 404.
    NotFound,
    /// Lease lost or unique-key collision; the worker silently aborts.
    Concurrency,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, Self::TransientStorage | Self::TransientUpstream)
    }

    pub fn is_permanent(self) -> bool {
        matches!(self, Self::PermanentInput)
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("permanent input error: {0}")]
    PermanentInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) => ErrorKind::TransientStorage,
            Self::Constraint(_) => ErrorKind::PermanentInput,
            Self::Upstream(_) => ErrorKind::TransientUpstream,
            Self::PermanentInput(_) => ErrorKind::PermanentInput,
            Self::Unauthorized(_) => ErrorKind::Auth,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Concurrency(_) => ErrorKind::Concurrency,
            Self::Serde(_) => ErrorKind::PermanentInput,
        }
    }

    /// Translate into the uniform pipeline result enum (§7 propagation policy).
    pub fn to_outcome(&self) -> crate::entities::PipelineOutcome {
        use crate::entities::PipelineOutcome;
        if self.kind().is_transient() {
            PipelineOutcome::Retryable
        } else {
            PipelineOutcome::Permanent
        }
    }
}
