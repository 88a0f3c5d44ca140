//! File-backed store persisting state across process restarts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{OptionStore, StoreError, StoreResult, TransientStore};

/// Persisted document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    options: HashMap<String, Value>,
    #[serde(default)]
    transients: HashMap<String, TransientEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransientEntry {
    value: Value,
    /// Expiry as unix seconds. Instants don't survive restarts; wall-clock
    /// deadlines do, at the cost of tolerating clock adjustments.
    expires_at: u64,
}

/// JSON-document store implementing both store traits.
///
/// The whole state is rewritten on every mutation. That is deliberately
/// simple: the checksum store is persisted as one raw write per sync pass,
/// so write amplification stays bounded by pass frequency, not entry count.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonFileStore {
    /// Open a store at `path`, loading existing state if the file is present.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| StoreError::FileRead {
                path: path.clone(),
                source: e,
            })?;
            serde_json::from_str(&raw).map_err(|e| StoreError::InvalidState {
                path: path.clone(),
                reason: e.to_string(),
            })?
        } else {
            StoreState {
                version: 1,
                ..Default::default()
            }
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, state: &StoreState) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::FileWrite {
                path: self.path.clone(),
                source: e,
            })?;
        }
        fs::write(&self.path, json).map_err(|e| StoreError::FileWrite {
            path: self.path.clone(),
            source: e,
        })
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl OptionStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().options.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.options.insert(key.to_string(), value);
        self.save(&state)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.options.remove(key).is_some() {
            self.save(&state)?;
        }
        Ok(())
    }
}

impl TransientStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock();
        match state.transients.get(key) {
            Some(entry) if now_secs() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                state.transients.remove(key);
                // Purge is best-effort; an unexpired read never depends on it.
                let _ = self.save(&state);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.transients.insert(
            key.to_string(),
            TransientEntry {
                value,
                expires_at: now_secs() + ttl.as_secs().max(1),
            },
        );
        self.save(&state)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.transients.remove(key).is_some() {
            self.save(&state)?;
        }
        Ok(())
    }
}
