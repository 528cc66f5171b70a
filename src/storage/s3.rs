use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;

use crate::app::error::AppError;

use super::{ObjectStore, PresignedUpload};

/// S3-compatible object store, shared by `STORAGE_TYPE=s3` and
/// `STORAGE_TYPE=minio` (MinIO speaks the S3 API; only the endpoint
/// resolver differs, configured when the client is constructed), mirroring
/// the teacher's `storage/client.rs` presigned-URL pattern generalized
/// from profile-picture uploads to tenant-scoped document uploads.
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        S3Storage {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in_secs: u64,
    ) -> Result<PresignedUpload, AppError> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(
                PresigningConfig::builder()
                    .expires_in(std::time::Duration::from_secs(expires_in_secs))
                    .build()
                    .map_err(|e| anyhow::anyhow!("invalid presign config: {e}"))?,
            )
            .await
            .map_err(|e| anyhow::anyhow!("failed to presign upload: {e}"))?;

        Ok(PresignedUpload {
            url: presigned.uri().to_string(),
            expires_in: expires_in_secs,
        })
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|_| AppError::StorageUnavailable)?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(|_| AppError::StorageUnavailable)?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("failed to delete object: {e}"))?;

        Ok(())
    }
}
