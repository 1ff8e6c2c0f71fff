//! Durable key/value storage and the storage gate.
//!
//! The rest of the crate never touches a [`KeyValueStore`] directly. Every
//! read and write goes through [`StorageGate`], which probes the backend and
//! normalizes every backend failure to "unavailable":
//!
//! - reads from an unavailable store yield [`StoredValue::Unavailable`]
//! - writes to an unavailable store are skipped and report `false`
//!
//! Only three keys are ever persisted (see [`StorageKey`]).

use crate::error::StorageError;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key written and removed by the availability probe.
pub const PROBE_KEY: &str = "__xpromo_storage_probe__";

/// Keys persisted by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// When the banner was last dismissed.
    BannerLastClosed,
    /// When the listing-click modal was last clicked.
    LastModalClick,
    /// How many times the listing-click modal has been dismissed.
    ModalDismissCount,
}

impl StorageKey {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BannerLastClosed => "bannerLastClosed",
            Self::LastModalClick => "lastModalClick",
            Self::ModalDismissCount => "modalDismissCount",
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend for durable client-side storage.
///
/// Implementations may fail on any call (quota, disabled storage, permission
/// errors). Writes are last-writer-wins scalar overwrites.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// In-process store.
///
/// Can be switched into failure modes to emulate private-browsing quota errors
/// or disabled storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, String>,
    disabled: bool,
    /// Maximum number of entries; writes beyond it fail with QuotaExceeded.
    quota: Option<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        {
            let mut inner = store.inner.lock();
            for (k, v) in entries {
                inner.entries.insert(k.into(), v.into());
            }
        }
        store
    }

    /// Every call fails with [`StorageError::Disabled`] while set.
    pub fn set_disabled(&self, disabled: bool) {
        self.inner.lock().disabled = disabled;
    }

    /// Writes that would grow the store past `quota` entries fail.
    pub fn set_quota(&self, quota: Option<usize>) {
        self.inner.lock().quota = quota;
    }

    /// Raw view of the stored entries, bypassing failure modes.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.lock().entries.clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let inner = self.inner.lock();
        if inner.disabled {
            return Err(StorageError::Disabled);
        }
        Ok(inner.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.disabled {
            return Err(StorageError::Disabled);
        }
        if let Some(quota) = inner.quota {
            if !inner.entries.contains_key(key) && inner.entries.len() >= quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        inner.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.disabled {
            return Err(StorageError::Disabled);
        }
        inner.entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// Store persisted as a flat JSON object of string values.
///
/// Every operation holds an advisory lock on the file (shared for reads,
/// exclusive for writes) until its handle is dropped, so processes sharing a
/// store never interleave a read-modify-write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        tracing::debug!(store = %path.display(), "Opened xpromo store");
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(&self) -> Result<File, StorageError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| io_to_storage(&e))
    }

    fn read_entries(file: &mut File) -> Result<BTreeMap<String, String>, StorageError> {
        let mut content = String::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_string(&mut content))
            .map_err(|e| io_to_storage(&e))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| StorageError::Corruption {
            details: e.to_string(),
        })
    }

    fn write_entries(
        file: &mut File,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(content.as_bytes()))
            .and_then(|()| file.sync_data())
            .map_err(|e| io_to_storage(&e))
    }

    fn modify(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut file = self.open_file()?;
        FileExt::lock_exclusive(&file).map_err(|e| io_to_storage(&e))?;
        // The lock is released when `file` is dropped.
        Self::read_entries(&mut file).and_then(|mut entries| {
            apply(&mut entries);
            Self::write_entries(&mut file, &entries)
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        let mut file = self.open_file()?;
        FileExt::lock_shared(&file).map_err(|e| io_to_storage(&e))?;
        Self::read_entries(&mut file).map(|mut entries| entries.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}

fn io_to_storage(err: &std::io::Error) -> StorageError {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => StorageError::SecurityDenied(err.to_string()),
        std::io::ErrorKind::StorageFull => StorageError::QuotaExceeded {
            key: String::new(),
        },
        _ => StorageError::Backend(err.to_string()),
    }
}

// =============================================================================
// Storage gate
// =============================================================================

/// Outcome of a gated read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Storage cannot be used (absent backend, probe failure, read failure).
    Unavailable,
    /// Storage works but the key was never written.
    Missing,
    Present(String),
}

/// Capability-checked adapter over an optional [`KeyValueStore`].
///
/// No method on the gate returns an error or panics; backend failures are
/// logged and collapse to "unavailable".
#[derive(Clone, Default)]
pub struct StorageGate {
    store: Option<Arc<dyn KeyValueStore>>,
}

impl std::fmt::Debug for StorageGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageGate")
            .field("backend", &self.store.is_some())
            .finish()
    }
}

impl StorageGate {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Gate for an environment with no durable storage at all.
    #[must_use]
    pub fn unavailable() -> Self {
        Self { store: None }
    }

    /// Probe the backend once and return a view that reuses the verdict.
    ///
    /// Callers doing several reads or writes for one operation take a single
    /// `checked()` view so the probe (a write and a remove) runs once.
    #[must_use]
    pub fn checked(&self) -> CheckedStorage<'_> {
        let store = self.store.as_deref().filter(|store| probe(*store));
        CheckedStorage { store }
    }

    /// Probe whether durable storage is usable right now.
    pub fn is_available(&self) -> bool {
        self.checked().is_available()
    }

    /// Read `key`, normalizing failures to [`StoredValue::Unavailable`].
    pub fn read(&self, key: StorageKey) -> StoredValue {
        self.checked().read(key)
    }

    /// Write `key`; a no-op returning `false` when storage is unavailable.
    pub fn write(&self, key: StorageKey, value: &str) -> bool {
        self.checked().write(key, value)
    }
}

/// Writes and removes [`PROBE_KEY`]; nothing else is touched.
fn probe(store: &dyn KeyValueStore) -> bool {
    match store
        .set(PROBE_KEY, PROBE_KEY)
        .and_then(|()| store.remove(PROBE_KEY))
    {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, "Storage probe failed; treating storage as unavailable");
            false
        }
    }
}

/// A [`StorageGate`] after one availability probe.
///
/// `store` is `None` when the gate has no backend or the probe failed.
#[derive(Clone, Copy)]
pub struct CheckedStorage<'a> {
    store: Option<&'a dyn KeyValueStore>,
}

impl std::fmt::Debug for CheckedStorage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckedStorage")
            .field("available", &self.store.is_some())
            .finish()
    }
}

impl CheckedStorage<'_> {
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn read(&self, key: StorageKey) -> StoredValue {
        let Some(store) = self.store else {
            return StoredValue::Unavailable;
        };
        match store.get(key.as_str()) {
            Ok(Some(value)) if !value.is_empty() => StoredValue::Present(value),
            Ok(_) => StoredValue::Missing,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "Storage read failed; treating storage as unavailable");
                StoredValue::Unavailable
            }
        }
    }

    pub fn write(&self, key: StorageKey, value: &str) -> bool {
        let Some(store) = self.store else {
            tracing::debug!(key = %key, "Storage unavailable; skipping write");
            return false;
        };
        match store.set(key.as_str(), value) {
            Ok(()) => {
                tracing::debug!(key = %key, "Persisted xpromo state");
                true
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "Storage write failed; dropping update");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_are_stable() {
        assert_eq!(StorageKey::BannerLastClosed.as_str(), "bannerLastClosed");
        assert_eq!(StorageKey::LastModalClick.as_str(), "lastModalClick");
        assert_eq!(StorageKey::ModalDismissCount.as_str(), "modalDismissCount");
    }

    #[test]
    fn gate_without_backend_is_unavailable() {
        let gate = StorageGate::unavailable();
        assert!(!gate.is_available());
        assert_eq!(gate.read(StorageKey::BannerLastClosed), StoredValue::Unavailable);
        assert!(!gate.write(StorageKey::BannerLastClosed, "x"));
    }

    #[test]
    fn probe_leaves_no_trace() {
        let store = Arc::new(MemoryStore::new());
        let gate = StorageGate::new(store.clone());
        assert!(gate.is_available());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn disabled_store_collapses_to_unavailable() {
        let store = Arc::new(MemoryStore::with_entries([("bannerLastClosed", "x")]));
        store.set_disabled(true);
        let gate = StorageGate::new(store);
        assert!(!gate.is_available());
        assert_eq!(gate.read(StorageKey::BannerLastClosed), StoredValue::Unavailable);
        assert!(!gate.write(StorageKey::ModalDismissCount, "1"));
    }

    #[test]
    fn quota_exhaustion_fails_probe() {
        let store = Arc::new(MemoryStore::new());
        store.set_quota(Some(0));
        let gate = StorageGate::new(store);
        assert!(!gate.is_available());
    }

    #[test]
    fn read_distinguishes_missing_and_present() {
        let store = Arc::new(MemoryStore::new());
        let gate = StorageGate::new(store);
        assert_eq!(gate.read(StorageKey::LastModalClick), StoredValue::Missing);
        assert!(gate.write(StorageKey::LastModalClick, "2024-01-01T00:00:00Z"));
        assert_eq!(
            gate.read(StorageKey::LastModalClick),
            StoredValue::Present("2024-01-01T00:00:00Z".to_string())
        );
    }

    #[test]
    fn empty_value_reads_as_missing() {
        let store = Arc::new(MemoryStore::with_entries([("modalDismissCount", "")]));
        let gate = StorageGate::new(store);
        assert_eq!(gate.read(StorageKey::ModalDismissCount), StoredValue::Missing);
    }

    #[test]
    fn json_file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let store = JsonFileStore::open(&path).unwrap();

        assert_eq!(store.get("bannerLastClosed").unwrap(), None);
        store.set("bannerLastClosed", "2024-05-01T10:00:00Z").unwrap();
        store.set("modalDismissCount", "3").unwrap();
        store.set("modalDismissCount", "4").unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("bannerLastClosed").unwrap().as_deref(),
            Some("2024-05-01T10:00:00Z")
        );
        assert_eq!(reopened.get("modalDismissCount").unwrap().as_deref(), Some("4"));

        reopened.remove("modalDismissCount").unwrap();
        assert_eq!(store.get("modalDismissCount").unwrap(), None);
    }

    #[test]
    fn corrupt_store_file_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::open(&path).unwrap();
        assert!(matches!(
            store.get("bannerLastClosed"),
            Err(StorageError::Corruption { .. })
        ));

        let gate = StorageGate::new(Arc::new(store));
        assert!(!gate.is_available());
    }

    #[test]
    fn json_file_store_releases_lock_after_each_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileStore::open(&path).unwrap();

        store.set("modalDismissCount", "1").unwrap();
        let other = File::open(&path).unwrap();
        FileExt::try_lock_exclusive(&other).unwrap();
        FileExt::unlock(&other).unwrap();

        assert_eq!(store.get("modalDismissCount").unwrap().as_deref(), Some("1"));
        FileExt::try_lock_exclusive(&other).unwrap();
    }

    #[test]
    fn checked_view_reuses_availability_verdict() {
        let store = Arc::new(MemoryStore::new());
        let gate = StorageGate::new(store.clone());
        let storage = gate.checked();

        store.set_disabled(true);
        assert!(storage.is_available());
        assert_eq!(storage.read(StorageKey::BannerLastClosed), StoredValue::Unavailable);
        assert!(!gate.checked().is_available());
    }
}
