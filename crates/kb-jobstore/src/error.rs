//! `StorageError` (transient) vs `ConstraintError` (permanent) — §4.1 failure semantics.

use kb_core::error::{CoreError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobStoreError {
    /// Connection drop, timeout, deadlock victim — retry the operation.
    #[error("storage error: {0}")]
    Storage(String),
    /// FK violation, unique violation on something other than an idempotency key,
    /// malformed input — fatal for the calling job.
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl JobStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<JobStoreError> for CoreError {
    fn from(e: JobStoreError) -> Self {
        match e {
            JobStoreError::Storage(m) => CoreError::Storage(m),
            JobStoreError::Constraint(m) => CoreError::Constraint(m),
            JobStoreError::NotFound(m) => CoreError::NotFound(m),
        }
    }
}

impl From<&JobStoreError> for ErrorKind {
    fn from(e: &JobStoreError) -> Self {
        match e {
            JobStoreError::Storage(_) => ErrorKind::TransientStorage,
            JobStoreError::Constraint(_) => ErrorKind::PermanentInput,
            JobStoreError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

impl From<sqlx::Error> for JobStoreError {
    fn from(e: sqlx::Error) -> Self {
        classify_sqlx_error(e)
    }
}

/// Classifies a `sqlx::Error` along the storage/constraint axis. Unique and
/// foreign-key violations are permanent; everything else (connection, pool,
/// protocol, I/O) is transient.
pub fn classify_sqlx_error(e: sqlx::Error) -> JobStoreError {
    match &e {
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                JobStoreError::Constraint(db_err.to_string())
            } else {
                JobStoreError::Storage(db_err.to_string())
            }
        }
        sqlx::Error::RowNotFound => JobStoreError::NotFound("row not found".to_string()),
        other => JobStoreError::Storage(other.to_string()),
    }
}
