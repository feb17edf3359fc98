//! Catalog Module
//!
//! The operations exposed to the HTTP layer. Ids and filenames arrive as raw
//! strings from request paths; anything that cannot name a stored batch or
//! image is reported as `NotFound`.

use crate::error::{Result, StoreError};
use crate::repository::BatchRepository;
use crate::{BatchId, BatchRecord, BatchSummary, BlobLocator, GridSettings, NewImage};
use std::sync::Arc;

#[derive(Clone)]
pub struct Catalog {
    repository: Arc<BatchRepository>,
}

impl Catalog {
    pub fn new(repository: Arc<BatchRepository>) -> Self {
        Self { repository }
    }

    #[cfg(test)]
    pub(crate) fn repository(&self) -> &BatchRepository {
        &self.repository
    }

    /// Summaries of every batch, unordered
    pub async fn list_summaries(&self) -> Result<Vec<BatchSummary>> {
        self.repository.list_summaries().await
    }

    pub async fn create_batch(
        &self,
        title: &str,
        grid: GridSettings,
        images: Vec<NewImage>,
    ) -> Result<BatchId> {
        let record = self.repository.create(title, grid, images).await?;
        Ok(record.id)
    }

    /// Open a batch, returning its record and one locator per image in order
    pub async fn get_batch(&self, id: &str) -> Result<(BatchRecord, Vec<BlobLocator>)> {
        let id = BatchId::parse(id)?;
        let record = self.repository.get(&id).await?;
        let locators = record
            .images
            .iter()
            .map(|image| self.repository.image_path(&id, &image.filename))
            .collect::<Result<Vec<_>>>()?;
        Ok((record, locators))
    }

    pub async fn delete_batch(&self, id: &str) -> Result<()> {
        self.repository.delete(&BatchId::parse(id)?).await
    }

    pub async fn get_blob(&self, id: &str, filename: &str) -> Result<Vec<u8>> {
        let locator = self.repository.image_path(&BatchId::parse(id)?, filename)?;
        self.repository
            .blob_store()
            .get(&locator.batch_id, &locator.filename)
            .await
    }

    pub async fn mark_printed(&self, id: &str, printed: bool) -> Result<()> {
        self.repository.set_printed(&BatchId::parse(id)?, printed).await
    }

    /// First image of a batch, for listing previews
    ///
    /// Does not count as opening the batch.
    pub async fn thumbnail(&self, id: &str) -> Result<(String, Vec<u8>)> {
        let id = BatchId::parse(id)?;
        let record = self.repository.peek(&id).await?;
        let first = record
            .images
            .first()
            .ok_or_else(|| StoreError::NotFound(format!("images of batch {id}")))?;
        let bytes = self.repository.blob_store().get(&id, &first.filename).await?;
        Ok((first.filename.clone(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const GIF: &[u8] = b"GIF89a\x01\0\x01\0";
    const WEBP: &[u8] = b"RIFF\x1a\0\0\0WEBPVP8 ";

    fn grid() -> GridSettings {
        GridSettings {
            card_width: 63.0,
            card_height: 88.0,
            card_padding: 3.0,
            gap: 2.0,
            page_margin: 10.0,
        }
    }

    fn image(bytes: &[u8]) -> NewImage {
        NewImage {
            bytes: bytes.to_vec(),
            original_name: None,
            object_position: [50.0, 50.0],
            rotation: 0,
        }
    }

    fn catalog() -> (TempDir, Catalog) {
        let temp_dir = TempDir::new().unwrap();
        let repo = BatchRepository::new(temp_dir.path().join("batches"));
        (temp_dir, Catalog::new(Arc::new(repo)))
    }

    #[tokio::test]
    async fn test_get_batch_returns_locators_in_order() {
        let (_tmp, catalog) = catalog();
        let id = catalog
            .create_batch("Cards", grid(), vec![image(GIF), image(WEBP)])
            .await
            .unwrap();

        let (record, locators) = catalog.get_batch(id.as_str()).await.unwrap();
        assert_eq!(record.id, id);
        let names: Vec<_> = locators.iter().map(|l| l.filename.as_str()).collect();
        assert_eq!(names, vec!["001.gif", "002.webp"]);
        assert!(locators.iter().all(|l| l.batch_id == id));

        assert_eq!(catalog.get_blob(id.as_str(), "002.webp").await.unwrap(), WEBP);
        assert!(
            catalog
                .get_blob(id.as_str(), "003.webp")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_thumbnail_is_first_image_without_opening() {
        let (_tmp, catalog) = catalog();
        let id = catalog
            .create_batch("Thumbs", grid(), vec![image(WEBP), image(GIF)])
            .await
            .unwrap();

        let (filename, bytes) = catalog.thumbnail(id.as_str()).await.unwrap();
        assert_eq!(filename, "001.webp");
        assert_eq!(bytes, WEBP);
        let record = catalog.repository().peek(&id).await.unwrap();
        assert_eq!(record.last_opened_at, None);

        let empty = catalog.create_batch("Empty", grid(), Vec::new()).await.unwrap();
        assert!(catalog.thumbnail(empty.as_str()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_malformed_ids_are_not_found() {
        let (_tmp, catalog) = catalog();
        for id in ["", "..", "../etc", "a/b", "x y"] {
            assert!(catalog.get_batch(id).await.unwrap_err().is_not_found());
            assert!(catalog.delete_batch(id).await.unwrap_err().is_not_found());
            assert!(catalog.mark_printed(id, true).await.unwrap_err().is_not_found());
        }
    }

    #[tokio::test]
    async fn test_mark_printed_shows_in_listing() {
        let (_tmp, catalog) = catalog();
        let id = catalog.create_batch("Done", grid(), Vec::new()).await.unwrap();
        catalog.mark_printed(id.as_str(), true).await.unwrap();

        let (record, _) = catalog.get_batch(id.as_str()).await.unwrap();
        assert!(record.printed);
        let summaries = catalog.list_summaries().await.unwrap();
        assert!(summaries.iter().all(|s| s.printed));
    }
}
