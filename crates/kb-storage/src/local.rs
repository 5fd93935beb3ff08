//! Local filesystem `BlobStorage` (§1.1), the default backend and the one
//! running under test — mirrors the original's `impl_local.py`.

use crate::error::StorageBackendError;
use crate::traits::BlobStorage;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct LocalBlobStorage {
    root: PathBuf,
    base_url: Option<String>,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self { root: root.into(), base_url }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn key_from_uri(storage_uri: &str) -> &str {
        storage_uri.strip_prefix("file://").unwrap_or(storage_uri)
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn upload(&self, key: &str, _content_type: &str, content: Vec<u8>) -> Result<String, StorageBackendError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(format!("file://{key}"))
    }

    async fn download(&self, storage_uri: &str) -> Result<Vec<u8>, StorageBackendError> {
        let key = Self::key_from_uri(storage_uri);
        let bytes = tokio::fs::read(self.path_for(key)).await?;
        Ok(bytes)
    }

    fn download_url(&self, storage_uri: &str) -> Option<String> {
        let key = Self::key_from_uri(storage_uri);
        self.base_url.as_ref().map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
    }

    async fn delete(&self, storage_uri: &str) -> Result<(), StorageBackendError> {
        let key = Self::key_from_uri(storage_uri);
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path(), Some("http://files.local".to_string()));
        let uri = storage.upload("docs/a.txt", "text/plain", b"hello".to_vec()).await.unwrap();
        assert_eq!(uri, "file://docs/a.txt");

        let bytes = storage.download(&uri).await.unwrap();
        assert_eq!(bytes, b"hello");

        assert_eq!(storage.download_url(&uri), Some("http://files.local/docs/a.txt".to_string()));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path(), None);
        storage.upload("a.txt", "text/plain", b"x".to_vec()).await.unwrap();
        storage.delete("file://a.txt").await.unwrap();
        storage.delete("file://a.txt").await.unwrap();
    }
}
