//! Entity persistence.

use super::entities::{EntityKind, Record};
use super::IndexerError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Write-once entity storage.
pub trait EntityStore: Send + Sync {
    fn load(&self, kind: EntityKind, id: &str) -> Option<Record>;

    /// Insert unless an entity with the same kind and id exists.
    /// Returns whether the record was written.
    fn save_if_absent(&self, record: Record) -> bool;

    fn count(&self, kind: EntityKind) -> usize;

    /// Last block fully indexed.
    fn cursor(&self) -> Option<u64>;

    /// Record `block` as fully indexed and persist.
    fn checkpoint(&self, block: u64) -> Result<(), IndexerError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: DashMap<(EntityKind, String), Record>,
    cursor: Mutex<Option<u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records of one kind, ordered by id.
    pub fn records(&self, kind: EntityKind) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .entities
            .iter()
            .filter(|e| e.key().0 == kind)
            .map(|e| e.value().clone())
            .collect();
        records.sort_by(|a, b| a.id().cmp(b.id()));
        records
    }

    fn snapshot(&self) -> Snapshot {
        let mut entities: Vec<Record> = self.entities.iter().map(|e| e.value().clone()).collect();
        entities.sort_by(|a, b| (a.kind(), a.id()).cmp(&(b.kind(), b.id())));
        Snapshot {
            cursor: *self.cursor.lock(),
            entities,
        }
    }
}

impl EntityStore for MemoryStore {
    fn load(&self, kind: EntityKind, id: &str) -> Option<Record> {
        self.entities
            .get(&(kind, id.to_string()))
            .map(|e| e.value().clone())
    }

    fn save_if_absent(&self, record: Record) -> bool {
        match self.entities.entry((record.kind(), record.id().to_string())) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    fn count(&self, kind: EntityKind) -> usize {
        self.entities.iter().filter(|e| e.key().0 == kind).count()
    }

    fn cursor(&self) -> Option<u64> {
        *self.cursor.lock()
    }

    fn checkpoint(&self, block: u64) -> Result<(), IndexerError> {
        *self.cursor.lock() = Some(block);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    cursor: Option<u64>,
    entities: Vec<Record>,
}

/// [`MemoryStore`] snapshotted to a JSON file at every checkpoint.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonStore {
    /// Open `path`, loading the previous snapshot if one exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexerError> {
        let path = path.as_ref().to_path_buf();
        let inner = MemoryStore::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| IndexerError::Io {
                path: path.clone(),
                source,
            })?;
            let snapshot: Snapshot =
                serde_json::from_str(&content).map_err(|source| IndexerError::Snapshot {
                    path: path.clone(),
                    source,
                })?;
            *inner.cursor.lock() = snapshot.cursor;
            for record in snapshot.entities {
                inner.save_if_absent(record);
            }
            info!(
                path = %path.display(),
                entities = inner.entities.len(),
                cursor = ?snapshot.cursor,
                "Indexer store loaded"
            );
        }

        Ok(Self { path, inner })
    }

    pub fn records(&self, kind: EntityKind) -> Vec<Record> {
        self.inner.records(kind)
    }

    fn flush(&self) -> Result<(), IndexerError> {
        let io = |source| IndexerError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let json = serde_json::to_string_pretty(&self.inner.snapshot()).map_err(|source| {
            IndexerError::Snapshot {
                path: self.path.clone(),
                source,
            }
        })?;
        // Atomic replace
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io)?;
        std::fs::rename(&tmp, &self.path).map_err(io)?;
        debug!(path = %self.path.display(), "Indexer store flushed");
        Ok(())
    }
}

impl EntityStore for JsonStore {
    fn load(&self, kind: EntityKind, id: &str) -> Option<Record> {
        self.inner.load(kind, id)
    }

    fn save_if_absent(&self, record: Record) -> bool {
        self.inner.save_if_absent(record)
    }

    fn count(&self, kind: EntityKind) -> usize {
        self.inner.count(kind)
    }

    fn cursor(&self) -> Option<u64> {
        self.inner.cursor()
    }

    fn checkpoint(&self, block: u64) -> Result<(), IndexerError> {
        self.inner.checkpoint(block)?;
        self.flush()
    }
}
