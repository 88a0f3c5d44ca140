//! Time-windowed suppression of repeated sync passes.
//!
//! A single process-wide lock persisted as an expiring entry: while the
//! entry exists, ordinary passes are suppressed. Expiry is the only
//! time-based transition; clearing it early is how latency-sensitive
//! options bypass the window.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::store::{StoreResult, TransientStore};

/// Transient key holding the lock marker.
const LOCK_KEY: &str = "sitesync_sync_lock";

/// Default suppression window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

/// Debounce lock backed by an expiring store entry.
pub struct DebounceLock {
    transients: Arc<dyn TransientStore>,
    window: Duration,
}

impl DebounceLock {
    pub fn new(transients: Arc<dyn TransientStore>, window: Duration) -> Self {
        Self { transients, window }
    }

    /// Whether an unexpired lock is present.
    pub fn is_locked(&self) -> bool {
        self.transients.get(LOCK_KEY).is_some()
    }

    /// Arm (or refresh) the lock to now + window.
    pub fn lock(&self) -> StoreResult<()> {
        self.transients.set(LOCK_KEY, json!(true), self.window)
    }

    /// Clear the lock before its window elapses.
    pub fn unlock(&self) -> StoreResult<()> {
        self.transients.delete(LOCK_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::thread::sleep;

    fn lock_with_window(ms: u64) -> DebounceLock {
        DebounceLock::new(Arc::new(MemoryStore::new()), Duration::from_millis(ms))
    }

    #[test]
    fn test_starts_unlocked() {
        assert!(!lock_with_window(50).is_locked());
    }

    #[test]
    fn test_lock_expires_on_its_own() {
        let lock = lock_with_window(40);
        lock.lock().unwrap();
        assert!(lock.is_locked());

        sleep(Duration::from_millis(60));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_unlock_clears_early() {
        let lock = lock_with_window(10_000);
        lock.lock().unwrap();
        lock.unlock().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_relock_refreshes_window() {
        let lock = lock_with_window(60);
        lock.lock().unwrap();
        sleep(Duration::from_millis(40));
        lock.lock().unwrap();
        sleep(Duration::from_millis(40));
        // 80ms after the first lock but only 40ms after the refresh.
        assert!(lock.is_locked());
    }
}
