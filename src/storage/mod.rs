//! Object storage abstraction (spec.md §6.5 `STORAGE_TYPE`). `S3Storage`
//! and `MinioStorage` share the teacher's `aws-sdk-s3` presigned-URL
//! pattern; `LocalStorage` backs `LOCAL_TEST_MODE` and integration tests so
//! they never need real AWS credentials.

pub mod local;
pub mod s3;

use async_trait::async_trait;

use crate::app::error::AppError;

#[derive(Debug, Clone)]
pub struct PresignedUpload {
    pub url: String,
    pub expires_in: u64,
}

/// The object store boundary the content service and ingestion worker
/// both depend on. Presigning and fetching are the only operations the
/// pipeline needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in_secs: u64,
    ) -> Result<PresignedUpload, AppError>;

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;
}
