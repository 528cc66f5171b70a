use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};

use crate::app::error::AppError;

use super::{ObjectStore, PresignedUpload};

/// Filesystem-backed object store used by `STORAGE_TYPE=local` and
/// `LOCAL_TEST_MODE`, so integration tests never need real AWS
/// credentials — grounded in the teacher's test suite, which already
/// avoids hitting real AWS by mocking at the HTTP layer.
pub struct LocalStorage {
    root: std::path::PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<std::path::PathBuf>, public_base_url: impl Into<String>) -> Self {
        LocalStorage {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    fn path_for(&self, key: &str) -> std::path::PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn presign_upload(
        &self,
        key: &str,
        _content_type: &str,
        expires_in_secs: u64,
    ) -> Result<PresignedUpload, AppError> {
        Ok(PresignedUpload {
            url: format!("{}/{}", self.public_base_url, key),
            expires_in: expires_in_secs,
        })
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, AppError> {
        fs::read(self.path_for(key))
            .await
            .map_err(|_| AppError::StorageUnavailable)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key);
        match fs::remove_file(path).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }
}

/// Test-only helper so `LOCAL_TEST_MODE` integration tests can seed bytes
/// at a key the way an object-store PUT callback would, without a real
/// HTTP round trip.
impl LocalStorage {
    pub async fn put(&self, key: &str, bytes: &[u8]) -> std::io::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(path).await?;
        file.write_all(bytes).await
    }
}
