//! In-process store used by tests and embedded callers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use super::{OptionStore, StoreResult, TransientStore};

/// In-memory implementation of both store traits.
///
/// Transient entries carry an [`Instant`] deadline and are purged lazily when
/// read. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    options: Mutex<HashMap<String, Value>>,
    transients: Mutex<HashMap<String, (Value, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored (non-transient) options.
    pub fn option_count(&self) -> usize {
        self.options.lock().len()
    }
}

impl OptionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.options.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.options.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.options.lock().remove(key);
        Ok(())
    }
}

impl TransientStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        let mut transients = self.transients.lock();
        match transients.get(key) {
            Some((value, deadline)) if Instant::now() < *deadline => Some(value.clone()),
            Some(_) => {
                // Expired: purge on read.
                transients.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()> {
        self.transients
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.transients.lock().remove(key);
        Ok(())
    }
}
