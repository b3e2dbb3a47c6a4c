//! Snapshot storage.

use crate::error::StorageError;
use crate::schema::Snapshot;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Snapshot metadata stored in the index alongside the snapshot files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub snapshot_id: String,
    /// Monotonic save counter; orders snapshots taken within the same millisecond.
    pub sequence: u64,
    pub created_at: i64,
    pub size_bytes: u64,
    pub checksum: String,
    pub definitions: usize,
    pub instances: usize,
}

/// Directory of full engine snapshots.
///
/// Each snapshot is a `<snapshot_id>.snap` JSON document. `index.json` maps
/// snapshot ids to their metadata, including a CRC32C checksum verified on
/// every load.
pub struct SnapshotStore {
    dir: PathBuf,
    index: RwLock<HashMap<String, SnapshotMeta>>,
}

impl SnapshotStore {
    /// Opens or creates a snapshot store at the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let store = Self {
            dir,
            index: RwLock::new(HashMap::new()),
        };

        store.load_index()?;

        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load_index(&self) -> Result<(), StorageError> {
        let index_path = self.dir.join("index.json");
        if !index_path.exists() {
            return Ok(());
        }

        let file = File::open(&index_path)?;
        let reader = BufReader::new(file);
        let index: HashMap<String, SnapshotMeta> = serde_json::from_reader(reader)?;
        *self.index.write() = index;

        Ok(())
    }

    fn save_index(&self) -> Result<(), StorageError> {
        self.write_index(&self.index.read())
    }

    fn write_index(&self, index: &HashMap<String, SnapshotMeta>) -> Result<(), StorageError> {
        let index_path = self.dir.join("index.json");
        let file = File::create(&index_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, index)?;
        Ok(())
    }

    /// Writes a snapshot and records it in the index.
    ///
    /// The index stays write-locked from sequence assignment until the index
    /// file is rewritten, so concurrent saves get distinct sequences.
    pub fn save(&self, snapshot: &Snapshot) -> Result<SnapshotMeta, StorageError> {
        let data = snapshot.to_json_pretty()?.into_bytes();
        let checksum = format!("{:08x}", crc32c::crc32c(&data));

        let mut index = self.index.write();
        let sequence = index.values().map(|m| m.sequence).max().map_or(1, |s| s + 1);
        let snapshot_id = format!(
            "snap-{:06}-{}",
            sequence,
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );

        let snapshot_path = self.snapshot_path(&snapshot_id);
        let mut file = File::create(&snapshot_path)?;
        file.write_all(&data)?;
        file.sync_all()?;

        let meta = SnapshotMeta {
            snapshot_id: snapshot_id.clone(),
            sequence,
            created_at: snapshot.created_at.timestamp_millis(),
            size_bytes: data.len() as u64,
            checksum,
            definitions: snapshot.definitions.len(),
            instances: snapshot.instances.len(),
        };

        index.insert(snapshot_id.clone(), meta.clone());
        self.write_index(&index)?;
        drop(index);

        tracing::info!(
            "Saved snapshot {} ({} definitions, {} instances, {} bytes)",
            snapshot_id,
            meta.definitions,
            meta.instances,
            meta.size_bytes
        );

        Ok(meta)
    }

    /// Loads a snapshot by id, verifying its checksum when indexed.
    pub fn load(&self, snapshot_id: &str) -> Result<Snapshot, StorageError> {
        let snapshot_path = self.snapshot_path(snapshot_id);
        if !snapshot_path.exists() {
            return Err(StorageError::SnapshotNotFound(snapshot_id.to_string()));
        }

        let mut file = File::open(&snapshot_path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if let Some(meta) = self.index.read().get(snapshot_id) {
            let actual_checksum = format!("{:08x}", crc32c::crc32c(&data));
            if actual_checksum != meta.checksum {
                return Err(StorageError::Corruption(format!(
                    "snapshot {} checksum mismatch",
                    snapshot_id
                )));
            }
        }

        let text = String::from_utf8(data).map_err(|_| {
            StorageError::Corruption(format!("snapshot {} is not valid UTF-8", snapshot_id))
        })?;
        Snapshot::from_json(&text)
    }

    /// Loads the most recently saved snapshot, if any.
    pub fn latest(&self) -> Result<Option<Snapshot>, StorageError> {
        let latest_id = self.list().pop().map(|m| m.snapshot_id);
        match latest_id {
            Some(id) => Ok(Some(self.load(&id)?)),
            None => Ok(None),
        }
    }

    /// Lists snapshot metadata, oldest first.
    pub fn list(&self) -> Vec<SnapshotMeta> {
        let mut metas: Vec<_> = self.index.read().values().cloned().collect();
        metas.sort_by_key(|m| m.sequence);
        metas
    }

    pub fn count(&self) -> usize {
        self.index.read().len()
    }

    /// Deletes a snapshot.
    pub fn delete(&self, snapshot_id: &str) -> Result<(), StorageError> {
        let snapshot_path = self.snapshot_path(snapshot_id);
        if snapshot_path.exists() {
            fs::remove_file(&snapshot_path)?;
        }

        self.index.write().remove(snapshot_id);
        self.save_index()?;

        Ok(())
    }

    /// Deletes all but the `keep` newest snapshots. Returns the deleted ids.
    pub fn prune(&self, keep: usize) -> Result<Vec<String>, StorageError> {
        let metas = self.list();
        let excess = metas.len().saturating_sub(keep);
        let mut deleted = Vec::with_capacity(excess);

        for meta in metas.into_iter().take(excess) {
            self.delete(&meta.snapshot_id)?;
            deleted.push(meta.snapshot_id);
        }

        if !deleted.is_empty() {
            tracing::debug!("Pruned {} snapshots, {} retained", deleted.len(), keep);
        }

        Ok(deleted)
    }

    fn snapshot_path(&self, snapshot_id: &str) -> PathBuf {
        self.dir.join(format!("{}.snap", snapshot_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use workflowd_core::{ActionDef, DefinitionSpec, StateDef, WorkflowEngine};

    fn engine_with(instances: usize) -> WorkflowEngine {
        let engine = WorkflowEngine::new();
        engine
            .create_definition(
                DefinitionSpec::new("Light")
                    .with_id("light")
                    .with_state(StateDef::new("off", "Off").initial())
                    .with_state(StateDef::new("on", "On"))
                    .with_action(ActionDef::new("toggle", "Toggle", ["off"], "on")),
            )
            .unwrap();
        for i in 0..instances {
            engine
                .start_instance("light", Some(&format!("i-{}", i)))
                .unwrap();
        }
        engine
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let engine = engine_with(2);
        engine.execute_action("i-1", "toggle").unwrap();

        let meta = store.save(&Snapshot::capture(&engine)).unwrap();
        assert_eq!(meta.definitions, 1);
        assert_eq!(meta.instances, 2);
        assert_eq!(meta.sequence, 1);

        let loaded = store.load(&meta.snapshot_id).unwrap();
        let target = WorkflowEngine::new();
        loaded.restore_into(&target).unwrap();
        assert_eq!(target.get_instance("i-1").unwrap().current_state_id(), "on");
    }

    #[test]
    fn test_latest_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(store.latest().unwrap().is_none());

        for n in 1..=3 {
            store.save(&Snapshot::capture(&engine_with(n))).unwrap();
        }

        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.instances.len(), 3);
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let saved = {
            let store = SnapshotStore::open(dir.path()).unwrap();
            store.save(&Snapshot::capture(&engine_with(1))).unwrap()
        };

        let store = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(store.list(), vec![saved.clone()]);

        let next = store.save(&Snapshot::capture(&engine_with(1))).unwrap();
        assert_eq!(next.sequence, saved.sequence + 1);
    }

    #[test]
    fn test_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let meta = store.save(&Snapshot::capture(&engine_with(1))).unwrap();

        let path = dir.path().join(format!("{}.snap", meta.snapshot_id));
        let mut data = fs::read(&path).unwrap();
        data.push(b' ');
        fs::write(&path, data).unwrap();

        assert!(matches!(
            store.load(&meta.snapshot_id),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load("snap-nope"),
            Err(StorageError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let ids: Vec<_> = (1..=5)
            .map(|n| store.save(&Snapshot::capture(&engine_with(n))).unwrap().snapshot_id)
            .collect();

        let deleted = store.prune(2).unwrap();
        assert_eq!(deleted, ids[..3].to_vec());
        assert_eq!(store.count(), 2);

        let remaining: Vec<_> = store.list().into_iter().map(|m| m.snapshot_id).collect();
        assert_eq!(remaining, ids[3..].to_vec());
        assert!(!dir.path().join(format!("{}.snap", ids[0])).exists());

        assert!(store.prune(10).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_saves_get_distinct_sequences() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let snapshot = Snapshot::capture(&engine_with(1));

        let mut sequences: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| store.save(&snapshot).unwrap().sequence))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        sequences.sort_unstable();

        assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());
        assert_eq!(store.count(), 8);

        let reopened = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.list().last().unwrap().sequence, 8);
    }
}
