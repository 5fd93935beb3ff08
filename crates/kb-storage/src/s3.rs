//! S3-backed `BlobStorage`, gated by `STORAGE_BACKEND=s3` (§6.1) — `aws-sdk-s3`
//! matches the teacher's own optional `s3-native` feature dependency set.

use crate::error::StorageBackendError;
use crate::traits::BlobStorage;
use async_trait::async_trait;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

pub struct S3BlobStorage {
    client: Client,
    bucket: String,
    base_url: Option<String>,
}

impl S3BlobStorage {
    pub async fn new(
        endpoint_url: Option<&str>,
        region: &str,
        bucket: &str,
        access_key_id: &str,
        secret_access_key: &str,
        force_path_style: bool,
        base_url: Option<String>,
    ) -> Self {
        let credentials = Credentials::new(access_key_id, secret_access_key, None, None, "kb-storage");
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .credentials_provider(credentials);
        if let Some(endpoint) = endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared);
        if force_path_style {
            s3_config = s3_config.force_path_style(true);
        }
        let client = Client::from_conf(s3_config.build());
        Self { client, bucket: bucket.to_string(), base_url }
    }

    fn key_from_uri(storage_uri: &str) -> &str {
        storage_uri.strip_prefix("s3://").and_then(|rest| rest.split_once('/').map(|(_, key)| key)).unwrap_or(storage_uri)
    }
}

#[async_trait]
impl BlobStorage for S3BlobStorage {
    async fn upload(&self, key: &str, content_type: &str, content: Vec<u8>) -> Result<String, StorageBackendError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| StorageBackendError::Io(e.to_string()))?;
        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn download(&self, storage_uri: &str) -> Result<Vec<u8>, StorageBackendError> {
        let key = Self::key_from_uri(storage_uri);
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageBackendError::Io(e.to_string()))?;
        let bytes = object.body.collect().await.map_err(|e| StorageBackendError::Io(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    fn download_url(&self, storage_uri: &str) -> Option<String> {
        let key = Self::key_from_uri(storage_uri);
        self.base_url.as_ref().map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
    }

    async fn delete(&self, storage_uri: &str) -> Result<(), StorageBackendError> {
        let key = Self::key_from_uri(storage_uri);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageBackendError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_from_uri_strips_bucket_prefix() {
        assert_eq!(S3BlobStorage::key_from_uri("s3://my-bucket/docs/a.txt"), "docs/a.txt");
    }
}
