use super::{ignore_missing, sync_dir, write_atomic};
use crate::error::{Result, StoreError};
use crate::{BatchId, BatchRecord};
use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Name of the metadata document inside a batch directory
pub const CONFIG_FILE: &str = "config.json";

/// Metadata store
///
/// Persists one JSON `BatchRecord` per batch directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
    /// Makes every mutation fail with a permission error
    #[cfg(test)]
    fail_writes: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            #[cfg(test)]
            fail_writes: Default::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_writable(&self) -> io::Result<()> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "config store is read-only",
            ));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_writable(&self) -> io::Result<()> {
        Ok(())
    }

    pub fn batch_dir(&self, id: &BatchId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Read and validate the record of `id`
    ///
    /// # Returns
    /// * `NotFound` if no document exists
    /// * `Corrupt` if the document does not parse or breaks a record rule
    pub async fn read(&self, id: &BatchId) -> Result<BatchRecord> {
        let path = self.batch_dir(id).join(CONFIG_FILE);
        let content = fs::read(&path)
            .await
            .map_err(|e| StoreError::from_read(e, format!("batch {id}")))?;

        let record: BatchRecord =
            serde_json::from_slice(&content).map_err(|e| StoreError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        record.validate().map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(record)
    }

    /// Persist the full record, replacing any previous version
    ///
    /// The document is synced before the rename, and both the batch directory
    /// and the root are synced after it, so the batch survives a restart once
    /// this returns.
    pub async fn write(&self, id: &BatchId, record: &BatchRecord) -> Result<()> {
        self.check_writable()?;
        let dir = self.batch_dir(id);
        fs::create_dir_all(&dir).await?;

        let content = serde_json::to_vec_pretty(record).map_err(io::Error::from)?;
        write_atomic(&dir, CONFIG_FILE, &content).await?;
        sync_dir(&self.root).await?;
        debug!("Wrote {} for batch {}", CONFIG_FILE, id);
        Ok(())
    }

    /// Every batch directory under the root, valid document or not
    pub async fn list_ids(&self) -> Result<BTreeSet<BatchId>> {
        let mut ids = BTreeSet::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(BatchId::parse) {
                Some(Ok(id)) => {
                    ids.insert(id);
                }
                _ => debug!("Ignoring non-batch directory {:?}", name),
            }
        }
        Ok(ids)
    }

    /// Remove the document; deleting a missing document is not an error
    pub async fn delete(&self, id: &BatchId) -> Result<()> {
        self.check_writable()?;
        let path = self.batch_dir(id).join(CONFIG_FILE);
        ignore_missing(fs::remove_file(path).await)?;
        Ok(())
    }

    pub async fn exists(&self, id: &BatchId) -> Result<bool> {
        Ok(fs::try_exists(self.batch_dir(id)).await?)
    }

    /// Remove whatever is left of the batch directory
    pub async fn remove_dir(&self, id: &BatchId) -> Result<()> {
        self.check_writable()?;
        ignore_missing(fs::remove_dir_all(self.batch_dir(id)).await)?;
        Ok(())
    }
}
