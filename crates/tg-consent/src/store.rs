// store.rs - Consent record storage.
//
// The store holds current state only: one record per (subject, sub-capability)
// pair, either a live grant or a revocation tombstone. Tombstones keep the
// revoke timestamp so a grant callback carrying an older timestamp cannot
// resurrect consent. History lives in the audit sink, not here.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Current consent state for one pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConsentState {
    Granted { at: DateTime<Utc> },
    Revoked { at: DateTime<Utc> },
}

impl ConsentState {
    /// Logical timestamp used for last-writer-wins ordering.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            ConsentState::Granted { at } | ConsentState::Revoked { at } => *at,
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, ConsentState::Granted { .. })
    }
}

/// One stored entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentRecord {
    pub subject_id: String,
    pub sub_capability_key: String,
    #[serde(flatten)]
    pub state: ConsentState,
    /// Ontology version the write was validated against.
    pub ontology_version: String,
}

impl ConsentRecord {
    fn key(&self) -> (String, String) {
        (self.subject_id.clone(), self.sub_capability_key.clone())
    }
}

/// Storage backend for the consent ledger.
///
/// Each call is atomic on its own; the ledger serializes read-modify-write
/// sequences itself.
pub trait ConsentStore: Send + Sync {
    fn get(&self, subject_id: &str, sub_capability_key: &str)
        -> Result<Option<ConsentRecord>, StoreError>;

    /// Store the record for its pair, unless the pair already holds a state
    /// with a newer timestamp. Ties go to the incoming record.
    fn put(&self, record: ConsentRecord) -> Result<(), StoreError>;

    /// Undo a `put`: if the pair still holds `applied`, put `previous` back
    /// (or drop the pair when there was none). Returns whether it did.
    fn restore(
        &self,
        applied: &ConsentRecord,
        previous: Option<ConsentRecord>,
    ) -> Result<bool, StoreError>;

    /// Drop the record for a pair. Returns whether one existed.
    fn remove(&self, subject_id: &str, sub_capability_key: &str) -> Result<bool, StoreError>;

    /// All records, in no particular order.
    fn list(&self) -> Result<Vec<ConsentRecord>, StoreError>;
}

type RecordMap = HashMap<(String, String), ConsentRecord>;

fn pair(subject_id: &str, sub_capability_key: &str) -> (String, String) {
    (subject_id.to_string(), sub_capability_key.to_string())
}

/// Last-writer-wins insert. Returns whether the map changed.
fn merge(records: &mut RecordMap, record: ConsentRecord) -> bool {
    let key = record.key();
    if let Some(existing) = records.get(&key) {
        if existing.state.at() > record.state.at() {
            return false;
        }
    }
    records.insert(key, record);
    true
}

/// Put `previous` back if `applied` is still current. Returns whether the map
/// changed.
fn unmerge(
    records: &mut RecordMap,
    applied: &ConsentRecord,
    previous: Option<ConsentRecord>,
) -> bool {
    let key = applied.key();
    if records.get(&key) != Some(applied) {
        return false;
    }
    match previous {
        Some(previous) => records.insert(key, previous),
        None => records.remove(&key),
    };
    true
}

/// Session-lifetime store. Everything is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryConsentStore {
    records: RwLock<RecordMap>,
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConsentStore for MemoryConsentStore {
    fn get(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
    ) -> Result<Option<ConsentRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(&pair(subject_id, sub_capability_key)).cloned())
    }

    fn put(&self, record: ConsentRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        merge(&mut records, record);
        Ok(())
    }

    fn restore(
        &self,
        applied: &ConsentRecord,
        previous: Option<ConsentRecord>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(unmerge(&mut records, applied, previous))
    }

    fn remove(&self, subject_id: &str, sub_capability_key: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(records.remove(&pair(subject_id, sub_capability_key)).is_some())
    }

    fn list(&self) -> Result<Vec<ConsentRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.values().cloned().collect())
    }
}

/// A lock older than this is assumed to belong to a crashed writer.
const STALE_LOCK: Duration = Duration::from_secs(10);

/// How long a writer waits for the lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(12);

/// Durable store: a JSON array of records, rewritten on every change.
///
/// Several handles (and several processes) may share one file. Nothing is
/// cached: every read loads the file, and every write takes a sibling
/// `<file>.lock`, re-reads the file, merges by timestamp and renames a temp
/// file into place. A newer state on disk is never overwritten by an older
/// one, whichever handle writes last.
#[derive(Debug)]
pub struct FileConsentStore {
    path: PathBuf,
    lock_path: PathBuf,
    tmp_path: PathBuf,
}

impl FileConsentStore {
    /// Open the store at `path`. A missing or empty file is an empty store;
    /// a corrupt one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let store = Self {
            lock_path: sibling(&path, "lock"),
            tmp_path: sibling(&path, "tmp"),
            path,
        };
        let records = store.load()?;
        tracing::debug!(path = %store.path.display(), records = records.len(), "opened consent store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<RecordMap, StoreError> {
        let mut records = RecordMap::new();
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if !content.trim().is_empty() {
            let list: Vec<ConsentRecord> = serde_json::from_str(&content)?;
            for record in list {
                records.insert(record.key(), record);
            }
        }
        Ok(records)
    }

    /// Load, apply `change`, and write back if it reports a change, all under
    /// the file lock.
    fn update<T>(
        &self,
        change: impl FnOnce(&mut RecordMap) -> (bool, T),
    ) -> Result<T, StoreError> {
        self.ensure_parent()?;
        let _lock = self.acquire_lock()?;
        let mut records = self.load()?;
        let (changed, result) = change(&mut records);
        if changed {
            self.flush(&records)?;
        }
        Ok(result)
    }

    fn ensure_parent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn acquire_lock(&self) -> Result<LockGuard, StoreError> {
        let start = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(_) => {
                    return Ok(LockGuard {
                        path: self.lock_path.clone(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.lock_is_stale() {
                        tracing::warn!(path = %self.lock_path.display(), "removing stale consent store lock");
                        let _ = std::fs::remove_file(&self.lock_path);
                        continue;
                    }
                    if start.elapsed() > LOCK_TIMEOUT {
                        return Err(StoreError::Locked {
                            path: self.lock_path.clone(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(source) => {
                    return Err(StoreError::Io {
                        path: self.lock_path.clone(),
                        source,
                    })
                }
            }
        }
    }

    fn lock_is_stale(&self) -> bool {
        std::fs::metadata(&self.lock_path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .is_some_and(|age| age > STALE_LOCK)
    }

    fn flush(&self, records: &RecordMap) -> Result<(), StoreError> {
        let mut list: Vec<&ConsentRecord> = records.values().collect();
        list.sort_by(|a, b| {
            (&a.subject_id, &a.sub_capability_key).cmp(&(&b.subject_id, &b.sub_capability_key))
        });
        let json = serde_json::to_string_pretty(&list)?;

        std::fs::write(&self.tmp_path, json).map_err(|source| StoreError::Io {
            path: self.tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&self.tmp_path, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

impl ConsentStore for FileConsentStore {
    fn get(
        &self,
        subject_id: &str,
        sub_capability_key: &str,
    ) -> Result<Option<ConsentRecord>, StoreError> {
        Ok(self.load()?.remove(&pair(subject_id, sub_capability_key)))
    }

    fn put(&self, record: ConsentRecord) -> Result<(), StoreError> {
        self.update(|records| (merge(records, record), ()))
    }

    fn restore(
        &self,
        applied: &ConsentRecord,
        previous: Option<ConsentRecord>,
    ) -> Result<bool, StoreError> {
        self.update(|records| {
            let changed = unmerge(records, applied, previous);
            (changed, changed)
        })
    }

    fn remove(&self, subject_id: &str, sub_capability_key: &str) -> Result<bool, StoreError> {
        self.update(|records| {
            let existed = records.remove(&pair(subject_id, sub_capability_key)).is_some();
            (existed, existed)
        })
    }

    fn list(&self) -> Result<Vec<ConsentRecord>, StoreError> {
        Ok(self.load()?.into_values().collect())
    }
}

/// `consents.json` -> `consents.json.<suffix>`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Removes the lock file when dropped.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
