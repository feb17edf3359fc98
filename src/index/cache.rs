use crate::error::Result;
use crate::storage::ConfigStore;
use crate::{BatchId, BatchSummary};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Index change made while a rebuild scan was running
#[derive(Debug)]
enum Change {
    Register(BatchSummary),
    Evict(BatchId),
    Printed(BatchId, bool),
}

impl Change {
    fn apply(self, map: &mut HashMap<BatchId, BatchSummary>) {
        match self {
            Change::Register(summary) => {
                map.insert(summary.id.clone(), summary);
            }
            Change::Evict(id) => {
                if map.remove(&id).is_some() {
                    debug!("Evicted batch {} from index", id);
                }
            }
            Change::Printed(id, printed) => {
                if let Some(summary) = map.get_mut(&id) {
                    summary.printed = printed;
                }
            }
        }
    }
}

#[derive(Default)]
struct IndexState {
    /// `None` until built
    entries: Option<HashMap<BatchId, BatchSummary>>,
    /// Changes seen since the running scan started, replayed onto its result
    pending: Option<Vec<Change>>,
    /// Bumped by `invalidate`; a scan that started before the bump is stale
    generation: u64,
}

/// In-memory summary index
///
/// The rebuild scan runs without holding the entries lock, so mutations never
/// wait on storage I/O. Changes that arrive mid-scan are journaled and replayed
/// over the scan result before it is published, which keeps an id evicted
/// during the scan out of the built index.
#[derive(Clone)]
pub struct BatchIndex {
    config_store: ConfigStore,
    state: Arc<Mutex<IndexState>>,
    /// Serializes rebuilds
    build: Arc<Mutex<()>>,
}

impl BatchIndex {
    pub fn new(config_store: ConfigStore) -> Self {
        Self {
            config_store,
            state: Arc::new(Mutex::new(IndexState::default())),
            build: Arc::new(Mutex::new(())),
        }
    }

    /// All known summaries, in no particular order
    ///
    /// The first call after construction or `invalidate` scans storage. Batches
    /// whose document cannot be read are logged and left out. Failing to
    /// enumerate the storage root is returned and the index stays unbuilt.
    pub async fn list(&self) -> Result<Vec<BatchSummary>> {
        loop {
            if let Some(summaries) = self.snapshot().await {
                return Ok(summaries);
            }

            let _build = self.build.lock().await;
            // Another caller may have finished a build while we waited
            let Some(generation) = self.begin_build().await else {
                continue;
            };
            let scanned = match self.scan().await {
                Ok(map) => map,
                Err(e) => {
                    self.state.lock().await.pending = None;
                    return Err(e);
                }
            };
            if let Some(summaries) = self.finish_build(generation, scanned).await {
                return Ok(summaries);
            }
            debug!("Batch index invalidated during rebuild, scanning again");
        }
    }

    async fn snapshot(&self) -> Option<Vec<BatchSummary>> {
        let state = self.state.lock().await;
        state
            .entries
            .as_ref()
            .map(|map| map.values().cloned().collect())
    }

    /// Start journaling changes; `None` if the index is already built
    async fn begin_build(&self) -> Option<u64> {
        let mut state = self.state.lock().await;
        if state.entries.is_some() {
            return None;
        }
        state.pending = Some(Vec::new());
        Some(state.generation)
    }

    /// Publish a scan result with the journaled changes replayed over it
    ///
    /// Returns `None` when the index was invalidated after the scan began.
    async fn finish_build(
        &self,
        generation: u64,
        mut scanned: HashMap<BatchId, BatchSummary>,
    ) -> Option<Vec<BatchSummary>> {
        let mut state = self.state.lock().await;
        let pending = state.pending.take().unwrap_or_default();
        if state.generation != generation {
            return None;
        }

        for change in pending {
            change.apply(&mut scanned);
        }
        let summaries = scanned.values().cloned().collect();
        state.entries = Some(scanned);
        Some(summaries)
    }

    async fn scan(&self) -> Result<HashMap<BatchId, BatchSummary>> {
        let ids = self.config_store.list_ids().await?;
        let mut map = HashMap::with_capacity(ids.len());

        for id in ids {
            match self.config_store.read(&id).await {
                Ok(record) if record.id == id => {
                    map.insert(id, record.summary());
                }
                Ok(record) => {
                    warn!(
                        "Skipping batch directory {}: document belongs to {}",
                        id, record.id
                    );
                }
                Err(e) => warn!("Skipping batch {} while building index: {}", id, e),
            }
        }

        info!("Batch index built with {} entries", map.len());
        Ok(map)
    }

    /// Apply a change to the built map, or journal it for a running scan
    async fn record(&self, change: Change) {
        let mut state = self.state.lock().await;
        if let Some(map) = state.entries.as_mut() {
            change.apply(map);
        } else if let Some(pending) = state.pending.as_mut() {
            pending.push(change);
        }
    }

    pub async fn register(&self, summary: BatchSummary) {
        self.record(Change::Register(summary)).await;
    }

    pub async fn evict(&self, id: &BatchId) {
        self.record(Change::Evict(id.clone())).await;
    }

    pub async fn update_printed(&self, id: &BatchId, printed: bool) {
        self.record(Change::Printed(id.clone(), printed)).await;
    }

    /// Drop the cached map; the next `list` rebuilds it from storage
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.entries = None;
        state.generation += 1;
        debug!("Batch index invalidated");
    }

    #[cfg(test)]
    pub(crate) async fn is_built(&self) -> bool {
        self.state.lock().await.entries.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CONFIG_FILE;
    use crate::{BatchRecord, GridSettings};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::fs;

    fn record(id: &str) -> BatchRecord {
        BatchRecord {
            id: BatchId::parse(id).unwrap(),
            title: format!("Batch {id}"),
            created_at: crate::types::now(),
            printed: false,
            last_opened_at: None,
            grid: GridSettings {
                card_width: 63.0,
                card_height: 88.0,
                card_padding: 3.0,
                gap: 2.0,
                page_margin: 10.0,
            },
            images: Vec::new(),
        }
    }

    async fn seed(store: &ConfigStore, ids: &[&str]) {
        for id in ids {
            let rec = record(id);
            store.write(&rec.id, &rec).await.unwrap();
        }
    }

    fn ids(mut summaries: Vec<BatchSummary>) -> Vec<String> {
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries.into_iter().map(|s| s.id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_build_skips_corrupt_documents() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new(temp_dir.path());
        seed(&store, &["a", "b", "c"]).await;
        fs::create_dir_all(temp_dir.path().join("broken")).await.unwrap();
        fs::write(temp_dir.path().join("broken").join(CONFIG_FILE), b"nope")
            .await
            .unwrap();

        let index = BatchIndex::new(store);
        assert_eq!(ids(index.list().await.unwrap()), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_build_skips_mismatched_ids_and_orphans() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new(temp_dir.path());
        seed(&store, &["a"]).await;
        // Document copied into another directory
        let mut copied = record("a");
        copied.title = "copy".to_string();
        store
            .write(&BatchId::parse("z").unwrap(), &copied)
            .await
            .unwrap();
        // Blobs without a document
        fs::create_dir_all(temp_dir.path().join("orphan").join("images"))
            .await
            .unwrap();

        let index = BatchIndex::new(store);
        assert_eq!(ids(index.list().await.unwrap()), vec!["a"]);
    }

    #[tokio::test]
    async fn test_mutations_before_build_are_noops() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new(temp_dir.path());
        let index = BatchIndex::new(store.clone());

        index.register(record("ghost").summary()).await;
        index.update_printed(&BatchId::parse("ghost").unwrap(), true).await;
        assert!(!index.is_built().await);

        seed(&store, &["real"]).await;
        assert_eq!(ids(index.list().await.unwrap()), vec!["real"]);
    }

    #[tokio::test]
    async fn test_built_index_serves_without_io() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new(temp_dir.path());
        seed(&store, &["a", "b"]).await;
        let index = BatchIndex::new(store.clone());
        index.list().await.unwrap();

        // Out-of-band change is not visible until invalidated
        seed(&store, &["c"]).await;
        assert_eq!(ids(index.list().await.unwrap()), vec!["a", "b"]);

        index.invalidate().await;
        assert_eq!(ids(index.list().await.unwrap()), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_register_evict_update() {
        let temp_dir = TempDir::new().unwrap();
        let index = BatchIndex::new(ConfigStore::new(temp_dir.path()));
        assert!(index.list().await.unwrap().is_empty());

        index.register(record("n").summary()).await;
        let id = BatchId::parse("n").unwrap();
        index.update_printed(&id, true).await;
        let listed = index.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].printed);

        index.evict(&id).await;
        assert!(index.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutations_do_not_wait_for_a_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        let index = BatchIndex::new(ConfigStore::new(temp_dir.path()));

        // A rebuild in progress holds the build lock for the whole scan
        let _build = index.build.lock().await;
        let generation = index.begin_build().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), index.register(record("n").summary()))
            .await
            .unwrap();
        assert_eq!(generation, 0);
    }

    #[tokio::test]
    async fn test_changes_during_scan_are_replayed() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new(temp_dir.path());
        seed(&store, &["a", "b", "c"]).await;
        let index = BatchIndex::new(store);

        let generation = index.begin_build().await.unwrap();
        let scanned = index.scan().await.unwrap();
        // Land after the scan read storage, before it publishes
        index.evict(&BatchId::parse("a").unwrap()).await;
        index.register(record("d").summary()).await;
        index.update_printed(&BatchId::parse("b").unwrap(), true).await;

        let mut listed = index.finish_build(generation, scanned).await.unwrap();
        listed.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(ids(listed.clone()), vec!["b", "c", "d"]);
        assert!(listed[0].printed);
        assert!(index.is_built().await);
    }

    #[tokio::test]
    async fn test_invalidate_during_scan_discards_result() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new(temp_dir.path());
        seed(&store, &["a"]).await;
        let index = BatchIndex::new(store.clone());

        let generation = index.begin_build().await.unwrap();
        let scanned = index.scan().await.unwrap();
        seed(&store, &["b"]).await;
        index.invalidate().await;

        assert!(index.finish_build(generation, scanned).await.is_none());
        assert!(!index.is_built().await);
        assert_eq!(ids(index.list().await.unwrap()), vec!["a", "b"]);
    }
}
