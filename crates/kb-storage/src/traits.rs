use crate::error::StorageBackendError;
use async_trait::async_trait;

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Uploads `content` under `key`, returning the `storage_uri` to persist on
    /// the `Document` row.
    async fn upload(&self, key: &str, content_type: &str, content: Vec<u8>) -> Result<String, StorageBackendError>;
    async fn download(&self, storage_uri: &str) -> Result<Vec<u8>, StorageBackendError>;
    /// A URL a client can fetch the object from directly, when the backend
    /// supports one (local serves from `FILE_BASE_URL`, S3 from its base URL).
    fn download_url(&self, storage_uri: &str) -> Option<String>;
    async fn delete(&self, storage_uri: &str) -> Result<(), StorageBackendError>;
}
