use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageBackendError {
    #[error("blob store I/O error: {0}")]
    Io(String),
    #[error("object not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for StorageBackendError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageBackendError::NotFound(e.to_string())
        } else {
            StorageBackendError::Io(e.to_string())
        }
    }
}
