//! Storage Module
//!
//! Filesystem persistence for batches. Every batch owns one directory under
//! the storage root:
//!
//! ```text
//! <root>/<batchId>/config.json
//! <root>/<batchId>/images/<seq>.<ext>
//! ```
//!
//! The layout is the on-disk format contract; the config store owns
//! `config.json` and the blob store owns `images/`.

mod blob_store;
mod config_store;

pub use blob_store::BlobStore;
pub use config_store::{CONFIG_FILE, ConfigStore};

use rand::Rng;
use std::io;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Write `bytes` to `dir/name` so readers see either the old or the new file
///
/// Data goes to a hidden temp file in the same directory, is synced to disk,
/// and is then renamed over the target. The directory is synced after the
/// rename so the new entry survives a crash.
pub(crate) async fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = dir.join(format!(".{}-{:08x}.tmp", name, rand::thread_rng().r#gen::<u32>()));
    let target = dir.join(name);

    let result = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        fs::rename(&tmp_path, &target).await
    }
    .await;

    if result.is_ok() {
        return sync_dir(dir).await;
    }

    // Leave no temp file behind; the original error is what matters
    let _ = fs::remove_file(&tmp_path).await;
    result
}

/// Flush directory entries (new files, renames) to disk
#[cfg(unix)]
pub(crate) async fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

/// Directories cannot be opened for syncing here; the rename is as durable as
/// the platform makes it
#[cfg(not(unix))]
pub(crate) async fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Treat a missing path as success for idempotent removals
pub(crate) fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_and_syncs() {
        let temp_dir = TempDir::new().unwrap();
        write_atomic(temp_dir.path(), "doc", b"old").await.unwrap();
        write_atomic(temp_dir.path(), "doc", b"new").await.unwrap();
        assert_eq!(fs::read(temp_dir.path().join("doc")).await.unwrap(), b"new");

        let mut entries = fs::read_dir(temp_dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().into_string().unwrap());
        }
        assert_eq!(names, vec!["doc".to_string()]);
    }

    #[tokio::test]
    async fn test_write_atomic_into_missing_dir_fails_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("gone");
        let err = write_atomic(&missing, "doc", b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(sync_dir(&missing).await.is_err());
        sync_dir(temp_dir.path()).await.unwrap();
    }
}
