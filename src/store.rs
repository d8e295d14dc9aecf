//! Insert-if-absent key/value store persisted as JSON
//!
//! Backs the split lock and the overlap registry. An entry, once present,
//! is never replaced: later inserts for the same key return the existing
//! value untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::writer::write_atomic;

/// Result of [`LockStore::insert_if_absent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lock<V> {
    /// No entry existed; the value was recorded
    Created(V),
    /// An entry already existed and was kept
    Existing(V),
}

impl<V> Lock<V> {
    pub fn value(&self) -> &V {
        match self {
            Lock::Created(v) | Lock::Existing(v) => v,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Lock::Created(v) | Lock::Existing(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Lock::Created(_))
    }
}

pub struct LockStore<V> {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, V>>,
    /// Entries created since load
    created: AtomicUsize,
}

impl<V> LockStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Open a store backed by `path`, loading existing entries if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Config(format!("corrupt lock store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::from_io(&path, e)),
        };

        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
            created: AtomicUsize::new(0),
        })
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn insert_if_absent(&self, key: impl Into<String>, value: V) -> Lock<V> {
        let key = key.into();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&key) {
            return Lock::Existing(existing.clone());
        }
        entries.insert(key, value.clone());
        self.created.fetch_add(1, Ordering::Relaxed);
        Lock::Created(value)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of entries added since the store was opened
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Copy of every entry, ordered by key
    pub fn snapshot(&self) -> BTreeMap<String, V> {
        self.entries.read().clone()
    }

    /// Write all entries to the backing file (no-op for in-memory stores)
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = {
            let entries = self.entries.read();
            serde_json::to_vec_pretty(&*entries)?
        };
        write_atomic(path, &json)
    }
}
