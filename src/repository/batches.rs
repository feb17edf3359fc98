//! Batch Repository
//!
//! Composes the config store, the blob store and the index into the
//! operations callers use. Every mutation follows the same ordering:
//!
//! 1. Storage first (blobs before the document on create, blobs before the
//!    document on delete)
//! 2. Index last
//!
//! A crash in the middle of `create` leaves orphaned blobs that no record
//! references. A crash in the middle of `delete` leaves at most a dangling
//! index entry, which is evicted the next time `get` misses or the index is
//! rebuilt.

use super::LockTable;
use crate::error::{Result, StoreError};
use crate::index::BatchIndex;
use crate::storage::{BlobStore, ConfigStore};
use crate::types::{check_filename, check_object_position, now};
use crate::{
    BatchId, BatchRecord, BatchSummary, BlobLocator, GridSettings, ImagePlacement, NewImage,
    Rotation, id,
};
use image::ImageFormat;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

/// Extension used when an upload's type cannot be determined
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Attempts at finding an unused id before giving up
const MAX_ID_ATTEMPTS: usize = 8;

pub struct BatchRepository {
    config_store: ConfigStore,
    blob_store: BlobStore,
    index: BatchIndex,
    locks: LockTable,
}

impl BatchRepository {
    /// Creates a repository over the batch storage root
    ///
    /// Nothing is read until the first call; the index builds itself lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let config_store = ConfigStore::new(&root);
        Self {
            blob_store: BlobStore::new(&root),
            index: BatchIndex::new(config_store.clone()),
            config_store,
            locks: LockTable::new(),
        }
    }

    pub fn blob_store(&self) -> &BlobStore {
        &self.blob_store
    }

    #[cfg(test)]
    pub(crate) fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    /// Persist a new batch
    ///
    /// Inputs are validated before anything touches storage. Images get
    /// `001.<ext>`, `002.<ext>`, ... in the order given.
    ///
    /// # Returns
    /// The stored record, or `InvalidInput` / `StorageUnavailable`
    pub async fn create(
        &self,
        title: &str,
        grid: GridSettings,
        images: Vec<NewImage>,
    ) -> Result<BatchRecord> {
        grid.validate()?;
        let mut placements = Vec::with_capacity(images.len());
        for (seq, upload) in images.iter().enumerate() {
            check_object_position(upload.object_position)?;
            placements.push(ImagePlacement {
                filename: blob_filename(seq + 1, upload),
                object_position: upload.object_position,
                rotation: Rotation::try_from(upload.rotation)?,
            });
        }

        let (id, _guard) = self.allocate_id().await?;

        // Step 1: blobs
        for (upload, placement) in images.iter().zip(&placements) {
            self.blob_store
                .put(&id, &placement.filename, &upload.bytes)
                .await?;
        }

        // Step 2: metadata
        let record = BatchRecord {
            id: id.clone(),
            title: title.to_string(),
            created_at: now(),
            printed: false,
            last_opened_at: None,
            grid,
            images: placements,
        };
        self.config_store.write(&id, &record).await?;

        // Step 3: index
        self.index.register(record.summary()).await;

        info!("Created batch {} with {} images", id, record.images.len());
        Ok(record)
    }

    /// Pick an id whose directory does not exist yet and lock it
    async fn allocate_id(&self) -> Result<(BatchId, OwnedMutexGuard<()>)> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = id::generate();
            let guard = self.locks.lock(&id).await;
            if !self.config_store.exists(&id).await? {
                return Ok((id, guard));
            }
            warn!("Generated batch id {} already exists, retrying", id);
        }
        Err(StoreError::StorageUnavailable(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not allocate an unused batch id",
        )))
    }

    /// Open a batch for viewing
    ///
    /// Records the open in `lastOpenedAt`. Failing to persist that timestamp
    /// is logged and does not fail the read.
    pub async fn get(&self, id: &BatchId) -> Result<BatchRecord> {
        let _guard = self.locks.lock(id).await;
        let mut record = self.read(id).await?;

        let opened = now();
        record.last_opened_at = Some(record.last_opened_at.map_or(opened, |prev| prev.max(opened)));
        if let Err(e) = self.config_store.write(id, &record).await {
            warn!("Could not record last open of batch {}: {}", id, e);
        }

        Ok(record)
    }

    /// Read a batch without recording an open
    pub async fn peek(&self, id: &BatchId) -> Result<BatchRecord> {
        self.read(id).await
    }

    /// Read through to the config store
    ///
    /// A corrupt document is reported to callers as `NotFound`. Either way a
    /// miss evicts the id, which heals index entries left behind by an
    /// interrupted delete.
    async fn read(&self, id: &BatchId) -> Result<BatchRecord> {
        match self.config_store.read(id).await {
            Ok(record) => Ok(record),
            Err(StoreError::Corrupt { reason, .. }) => {
                error!("Batch {} has a corrupt config document: {}", id, reason);
                self.index.evict(id).await;
                Err(StoreError::NotFound(format!("batch {id}")))
            }
            Err(e) if e.is_not_found() => {
                self.index.evict(id).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete a batch with all of its images
    ///
    /// # Returns
    /// `NotFound` if the batch directory does not exist
    pub async fn delete(&self, id: &BatchId) -> Result<()> {
        let _guard = self.locks.lock(id).await;
        if !self.config_store.exists(id).await? {
            self.index.evict(id).await;
            return Err(StoreError::NotFound(format!("batch {id}")));
        }

        self.blob_store.delete_all(id).await?;
        self.config_store.delete(id).await?;
        self.config_store.remove_dir(id).await?;
        self.index.evict(id).await;

        info!("Deleted batch {}", id);
        Ok(())
    }

    pub async fn set_printed(&self, id: &BatchId, printed: bool) -> Result<()> {
        let _guard = self.locks.lock(id).await;
        let mut record = self.read(id).await?;
        record.printed = printed;
        self.config_store.write(id, &record).await?;
        self.index.update_printed(id, printed).await;

        debug!("Batch {} printed={}", id, printed);
        Ok(())
    }

    /// Locator of one image; does not touch storage
    pub fn image_path(&self, id: &BatchId, filename: &str) -> Result<BlobLocator> {
        check_filename(filename)?;
        Ok(BlobLocator {
            batch_id: id.clone(),
            filename: filename.to_string(),
        })
    }

    pub async fn list_summaries(&self) -> Result<Vec<BatchSummary>> {
        self.index.list().await
    }

    /// Force the next listing to rescan storage
    pub async fn invalidate_index(&self) {
        self.index.invalidate().await;
    }
}

/// `<seq>.<ext>` with a three digit sequence number
fn blob_filename(seq: usize, upload: &NewImage) -> String {
    format!("{:03}.{}", seq, image_extension(upload))
}

/// Extension of the first image type that matches the upload
///
/// The bytes are sniffed first; the upload name only counts when it names a
/// known image type.
fn image_extension(upload: &NewImage) -> &'static str {
    let sniffed = image::guess_format(&upload.bytes).ok();
    let named = || {
        upload
            .original_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(ImageFormat::from_extension)
    };
    sniffed
        .or_else(named)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or(DEFAULT_EXTENSION)
}
