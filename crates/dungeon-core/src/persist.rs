//! Persistent state that survives restarts.
//!
//! Each manager owns one [`PersistentState`] keyed by its channel. A few
//! keys are reserved for the manager itself; every other key belongs to a
//! module and is wiped whenever the dungeon instance changes.
//!
//! # Stores
//!
//! - [`JsonFileStore`] -- `<state_dir>/<channel>.json`, written atomically
//!   through a temporary file and rename
//! - [`MemoryStore`] -- process-local, for tests and dry runs

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Set once modules have been initialized against this state.
pub const INIT_KEY: &str = "__init__";
/// Last known Hobopolis instance id.
pub const HOID_KEY: &str = "__hoid__";
/// Last known Dreadsylvania instance id.
pub const DVID_KEY: &str = "__dvid__";
/// Snapshot of the last Hobopolis events.
pub const LOG_KEY: &str = "__log__";

/// Keys owned by the manager rather than a module.
pub const RESERVED_KEYS: [&str; 4] = [INIT_KEY, HOID_KEY, DVID_KEY, LOG_KEY];

/// Errors raised by a [`PersistStore`].
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Reading or writing the state file failed.
    #[error("state file {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The state file is not valid JSON.
    #[error("state file {path} is corrupt: {source}")]
    Serde {
        /// The file involved.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// A manager's key-value state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentState {
    entries: BTreeMap<String, Value>,
}

impl PersistentState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is owned by the manager.
    pub fn is_reserved(key: &str) -> bool {
        RESERVED_KEYS.contains(&key)
    }

    /// Value under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Store `value` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the state is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instance id stored under a reserved key.
    pub fn instance_id(&self, key: &str) -> Option<i64> {
        self.entries.get(key).and_then(Value::as_i64)
    }

    /// Record an instance id under a reserved key.
    pub fn set_instance_id(&mut self, key: &str, id: i64) {
        self.entries.insert(key.to_owned(), Value::from(id));
    }

    /// Drop every module-owned key, keeping the reserved ones.
    pub fn wipe_module_keys(&mut self) {
        self.entries.retain(|key, _| Self::is_reserved(key));
    }
}

impl FromIterator<(String, Value)> for PersistentState {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Storage backend for [`PersistentState`].
pub trait PersistStore: Send + Sync {
    /// Load the state for `channel`, empty if none was saved.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if stored state exists but cannot be read.
    fn load(&self, channel: &str) -> Result<PersistentState, PersistError>;

    /// Replace the state for `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the state cannot be written.
    fn save(&self, channel: &str, state: &PersistentState) -> Result<(), PersistError>;

    /// Delete the state for `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if stored state exists but cannot be removed.
    fn clear(&self, channel: &str) -> Result<(), PersistError>;
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// One JSON file per channel.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store files under `dir`, created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of `channel`'s state file.
    pub fn path_for(&self, channel: &str) -> PathBuf {
        self.dir.join(format!("{channel}.json"))
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
        move |source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl PersistStore for JsonFileStore {
    fn load(&self, channel: &str) -> Result<PersistentState, PersistError> {
        let path = self.path_for(channel);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(channel, path = %path.display(), "no saved state");
                return Ok(PersistentState::new());
            }
            Err(e) => return Err(Self::io_error(&path)(e)),
        };
        serde_json::from_str(&contents).map_err(|source| PersistError::Serde { path, source })
    }

    fn save(&self, channel: &str, state: &PersistentState) -> Result<(), PersistError> {
        std::fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;

        let path = self.path_for(channel);
        let tmp = self.dir.join(format!("{channel}.json.tmp"));
        let json = serde_json::to_string_pretty(state).map_err(|source| PersistError::Serde {
            path: path.clone(),
            source,
        })?;

        std::fs::write(&tmp, json).map_err(Self::io_error(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(Self::io_error(&path))?;
        debug!(channel, keys = state.len(), "state saved");
        Ok(())
    }

    fn clear(&self, channel: &str) -> Result<(), PersistError> {
        let path = self.path_for(channel);
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(Self::io_error(&path)(e)),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<String, PersistentState>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with `state` for `channel`.
    pub fn with_state(channel: &str, state: PersistentState) -> Self {
        let store = Self::new();
        store
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.to_owned(), state);
        store
    }
}

impl PersistStore for MemoryStore {
    fn load(&self, channel: &str) -> Result<PersistentState, PersistError> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(states.get(channel).cloned().unwrap_or_default())
    }

    fn save(&self, channel: &str, state: &PersistentState) -> Result<(), PersistError> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.to_owned(), state.clone());
        Ok(())
    }

    fn clear(&self, channel: &str) -> Result<(), PersistError> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel);
        Ok(())
    }
}
