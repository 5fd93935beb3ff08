use kb_core::entities::PipelineOutcome;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document was deleted before processing")]
    DocumentDeleted,
    #[error("job store error: {0}")]
    JobStore(#[from] kb_jobstore::JobStoreError),
    #[error("storage backend error: {0}")]
    Storage(#[from] kb_storage::StorageBackendError),
    #[error("parse error: {0}")]
    Parse(#[from] kb_chunker::ParseError),
    #[error("chunk error: {0}")]
    Chunk(#[from] kb_chunker::ChunkError),
    #[error("embed error: {0}")]
    Embed(#[from] kb_embed::EmbedError),
    #[error("index error: {0}")]
    Index(#[from] kb_index::IndexError),
}

impl IngestError {
    /// Translates any ingest-stage failure into the uniform pipeline outcome
    /// (§7) that `LeaseScheduler` turns into a `finish_job` call.
    pub fn to_outcome(&self) -> PipelineOutcome {
        match self {
            IngestError::DocumentDeleted => PipelineOutcome::Permanent,
            IngestError::JobStore(e) => if e.is_retryable() { PipelineOutcome::Retryable } else { PipelineOutcome::Permanent },
            IngestError::Storage(_) => PipelineOutcome::Retryable,
            IngestError::Parse(e) => if e.is_retryable() { PipelineOutcome::Retryable } else { PipelineOutcome::Permanent },
            IngestError::Chunk(_) => PipelineOutcome::Permanent,
            IngestError::Embed(e) => if e.is_retryable() { PipelineOutcome::Retryable } else { PipelineOutcome::Permanent },
            IngestError::Index(e) => if e.is_retryable() { PipelineOutcome::Retryable } else { PipelineOutcome::Permanent },
        }
    }
}
