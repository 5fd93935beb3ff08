use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("no search backend is enabled for this space")]
    NoBackendEnabled,
    #[error("index backend error: {0}")]
    Index(#[from] kb_index::IndexError),
    #[error("job store error: {0}")]
    JobStore(#[from] kb_jobstore::JobStoreError),
}
