//! Injected key-value persistence.
//!
//! The tracker never touches ambient global state: everything it persists goes
//! through these two traits. `OptionStore` is durable storage keyed by string,
//! `TransientStore` adds a TTL so entries expire on their own. `MemoryStore`
//! backs tests; `JsonFileStore` persists across process restarts.

mod error;
mod json_file;
mod memory;

pub use error::{StoreError, StoreResult};
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use std::time::Duration;

use serde_json::Value;

/// Durable key-value storage for named values.
///
/// Writes are succeed-or-error with no retry logic; a failed write is
/// self-corrected on the next sync pass rather than retried here.
pub trait OptionStore: Send + Sync {
    /// Get a stored value, or `None` if the key is absent.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store a value under a key, replacing any existing value.
    fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Store a large blob under a key.
    ///
    /// Implementations with an autoload or hot cache keep raw entries out of
    /// it. For the implementations in this crate it behaves like [`set`],
    /// but callers storing large payloads (the checksum store) use this
    /// variant so swapping in a cache-aware backend needs no call-site change.
    ///
    /// [`set`]: OptionStore::set
    fn set_raw(&self, key: &str, value: Value) -> StoreResult<()> {
        self.set(key, value)
    }

    /// Remove a key. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Expiring key-value storage.
///
/// An entry set with a TTL reads back until the TTL elapses, then reads as
/// absent. Expired entries may be purged lazily on access.
pub trait TransientStore: Send + Sync {
    /// Get an unexpired value, or `None` if absent or expired.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store a value that expires after `ttl`.
    fn set(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()>;

    /// Remove a key before its TTL elapses.
    fn delete(&self, key: &str) -> StoreResult<()>;
}
