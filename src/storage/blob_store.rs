use super::{ignore_missing, write_atomic};
use crate::error::{Result, StoreError};
use crate::types::check_filename;
use crate::BatchId;
use std::path::PathBuf;
use tokio::fs;

const IMAGES_DIR: &str = "images";

/// Image byte store
///
/// Bytes are opaque: no validation, no transcoding.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn images_dir(&self, id: &BatchId) -> PathBuf {
        self.root.join(id.as_str()).join(IMAGES_DIR)
    }

    /// Write a blob, creating the batch's `images/` directory if needed
    pub async fn put(&self, id: &BatchId, filename: &str, bytes: &[u8]) -> Result<()> {
        check_filename(filename).map_err(|_| {
            StoreError::InvalidInput(format!("unsafe image filename {filename}"))
        })?;
        let dir = self.images_dir(id);
        fs::create_dir_all(&dir).await?;
        write_atomic(&dir, filename, bytes).await?;
        Ok(())
    }

    pub async fn get(&self, id: &BatchId, filename: &str) -> Result<Vec<u8>> {
        check_filename(filename)?;
        fs::read(self.images_dir(id).join(filename))
            .await
            .map_err(|e| StoreError::from_read(e, format!("image {filename} of batch {id}")))
    }

    /// Remove every blob of the batch; idempotent
    pub async fn delete_all(&self, id: &BatchId) -> Result<()> {
        ignore_missing(fs::remove_dir_all(self.images_dir(id)).await)?;
        Ok(())
    }
}
