//! S3 object relay
//!
//! Uploads and downloads whole objects on behalf of the enclave, which uses
//! them to hand snapshots and initialization blobs in and out.

use crate::error::{RelayError, Result};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::{debug, info};

/// S3 wrapper bound to one bucket
pub struct ObjectStore {
    client: S3Client,
    bucket: String,
}

impl ObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Stores `data` under `key`, replacing any existing object
    pub async fn upload(&self, key: &str, data: Bytes) -> Result<()> {
        info!(bucket = %self.bucket, key = %key, data_len = data.len(), "Uploading object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| RelayError::Storage(format!("PutObject failed: {}", e)))?;

        debug!(key = %key, "Object uploaded");
        Ok(())
    }

    /// Reads the object stored under `key`
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        info!(bucket = %self.bucket, key = %key, "Downloading object");

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service_error) if service_error.is_no_such_key() => {
                    RelayError::NotFound(format!("object {}", key))
                }
                _ => RelayError::Storage(format!("GetObject failed: {}", e)),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| RelayError::Storage(format!("Reading object body failed: {}", e)))?
            .into_bytes();

        debug!(key = %key, data_len = data.len(), "Object downloaded");
        Ok(data)
    }
}
