use std::path::{Path, PathBuf};

use async_trait::async_trait;
use portaflow_core::domain::attachment::{BlobMetadata, StorageRef};
use portaflow_core::ports::{BlobStore, StoreError};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

/// Content-addressed attachment storage on the local filesystem.
///
/// Files land at `<root>/sha256/<hex>/<sanitized-name>`; the relative part is
/// the storage reference. Writes go to a temporary sibling and are renamed
/// into place.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, storage_ref: &StorageRef) -> PathBuf {
        self.root.join(&storage_ref.0)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_blob(
        &self,
        bytes: &[u8],
        metadata: &BlobMetadata,
    ) -> Result<StorageRef, StoreError> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = format!("{:x}", hasher.finalize());
        let storage_ref =
            StorageRef(format!("sha256/{digest}/{}", sanitize_file_name(&metadata.file_name)));

        let target = self.path_for(&storage_ref);
        let directory = self.root.join("sha256").join(&digest);
        tokio::fs::create_dir_all(&directory).await.map_err(io_failure)?;

        let staging = directory.join(format!(".upload-{}", Uuid::new_v4().simple()));
        tokio::fs::write(&staging, bytes).await.map_err(io_failure)?;
        if let Err(error) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_failure(error));
        }

        info!(
            event_name = "workflow.blob.stored",
            request_id = %metadata.request_id,
            storage_ref = %storage_ref.0,
            size_bytes = metadata.size_bytes,
            "attachment stored"
        );
        Ok(storage_ref)
    }
}

fn io_failure(error: std::io::Error) -> StoreError {
    StoreError::Backend(format!("blob write failed: {error}"))
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
