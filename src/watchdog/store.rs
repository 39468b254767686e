//! State Store
//!
//! Load/save backends for [`WatchdogState`]. The file store is what the CLI
//! uses; the memory store backs tests and in-process embeddings.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::error::{StoreError, StoreResult};
use super::state::WatchdogState;

/// Persistence backend for the watchdog state
pub trait StateStore: Send {
    /// Load the last persisted state
    ///
    /// Returns `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> StoreResult<Option<WatchdogState>>;

    /// Persist the full state, replacing what was there
    fn save(&self, state: &WatchdogState) -> StoreResult<()>;
}

/// JSON file store
///
/// Writes go to a sibling `.tmp` file that is then renamed over the target,
/// so readers never observe a half-written state.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> StoreResult<Option<WatchdogState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let state = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(state))
    }

    fn save(&self, state: &WatchdogState) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(state).map_err(StoreError::Serialize)?;

        let temp_path = self.temp_path();
        fs::write(&temp_path, json).map_err(|source| StoreError::Write {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!("Saved watchdog state to {:?}", self.path);
        Ok(())
    }
}

/// In-memory store
///
/// Clones share the same slot. Failures can be injected to exercise the
/// gate's degradation paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemorySlot>>,
}

#[derive(Debug, Default)]
struct MemorySlot {
    state: Option<WatchdogState>,
    fail_load: bool,
    fail_save: bool,
    saves: usize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `state`
    pub fn with_state(state: WatchdogState) -> Self {
        let store = Self::new();
        store.slot().state = Some(state);
        store
    }

    /// Current contents, if any
    pub fn snapshot(&self) -> Option<WatchdogState> {
        self.slot().state.clone()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.slot().saves
    }

    /// Make every subsequent load fail
    pub fn fail_loads(&self, fail: bool) {
        self.slot().fail_load = fail;
    }

    /// Make every subsequent save fail
    pub fn fail_saves(&self, fail: bool) {
        self.slot().fail_save = fail;
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, MemorySlot> {
        // A poisoned slot still holds consistent data: every write is a
        // single assignment.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> StoreResult<Option<WatchdogState>> {
        let slot = self.slot();
        if slot.fail_load {
            return Err(StoreError::Unavailable("injected load failure".to_string()));
        }
        Ok(slot.state.clone())
    }

    fn save(&self, state: &WatchdogState) -> StoreResult<()> {
        let mut slot = self.slot();
        if slot.fail_save {
            return Err(StoreError::Unavailable("injected save failure".to_string()));
        }
        slot.state = Some(state.clone());
        slot.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::state::HistoryEntry;
    use tempfile::TempDir;

    fn sample_state() -> WatchdogState {
        WatchdogState {
            last_check_time: 1_000,
            cooldown_until: 31_000,
            total_blocked: 2,
            history: vec![HistoryEntry::new(900, 4000), HistoryEntry::new(1_000, 250)],
        }
    }

    #[test]
    fn test_file_store_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("state.json");
        let store = JsonFileStore::new(&path);

        store.save(&sample_state()).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("nested/deeper/state.json.tmp").exists());
        assert_eq!(store.load().unwrap(), Some(sample_state()));
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_file_store_wrong_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"history": "nope"}"#).unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_file_store_unwritable_parent() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let store = JsonFileStore::new(blocker.join("state.json"));
        assert!(matches!(
            store.save(&sample_state()),
            Err(StoreError::CreateDir { .. })
        ));
    }

    #[test]
    fn test_file_store_save_load_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStore::new(&path);
        store.save(&sample_state()).unwrap();
        let first = fs::read_to_string(&path).unwrap();

        let loaded = store.load().unwrap().unwrap();
        store.save(&loaded).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), first);
        assert_eq!(store.load().unwrap(), Some(loaded));
    }

    #[test]
    fn test_memory_store_shared_between_clones() {
        let store = MemoryStore::new();
        let other = store.clone();
        assert!(store.load().unwrap().is_none());

        other.save(&sample_state()).unwrap();
        assert_eq!(store.snapshot(), Some(sample_state()));
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_memory_store_injected_failures() {
        let store = MemoryStore::with_state(sample_state());
        store.fail_loads(true);
        assert!(matches!(store.load(), Err(StoreError::Unavailable(_))));

        store.fail_saves(true);
        assert!(store.save(&WatchdogState::new()).is_err());
        assert_eq!(store.snapshot(), Some(sample_state()));
    }
}
