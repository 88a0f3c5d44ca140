//! The callable change tracker.
//!
//! One sync pass evaluates every whitelisted producer, compares each value's
//! checksum against the persisted checksum store, and publishes an event per
//! changed value. Passes are throttled by a debounce lock; a handful of
//! latency-sensitive options bypass the throttle by unlocking early.
//!
//! Concurrency: passes are synchronous and request-scoped. Two simultaneous
//! passes can race on the lock and the checksum store; the worst outcome is a
//! duplicate emission or a briefly stale checksum, corrected on the next pass.

mod checksum;
mod debounce;
mod error;

pub use checksum::stable_checksum;
pub use debounce::{DEFAULT_WINDOW, DebounceLock};
pub use error::{SyncError, SyncResult};

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::callables::{ALWAYS_SEND, ALWAYS_SEND_OPTIONS, IDC_OVERRIDE, Whitelist};
use crate::context::{CurrentIdentity, ExecContext};
use crate::events::{
    EventBus, TOPIC_CALLABLE_CHANGED, TOPIC_FULL_SYNC, TOPIC_OPTION_DELETED, TOPIC_OPTION_UPDATED,
};
use crate::store::{OptionStore, TransientStore};
use crate::{debug_event, log_event};

/// Option key holding the persisted name → checksum map. Written raw:
/// it grows with the whitelist and never belongs in a hot cache.
pub const CHECKSUM_OPTION_KEY: &str = "sitesync_callable_checksums";

/// Option key acting as the force-sync override. Truthy value bypasses the
/// debounce gate for one pass and is consumed by that pass.
pub const FORCE_SYNC_OPTION_KEY: &str = "sitesync_force_sync";

/// Option key for the identity-migration flag. While truthy, the site
/// identity callables re-emit even with unchanged checksums.
pub const IDC_MIGRATION_OPTION_KEY: &str = "sitesync_migrate_for_idc";

/// Cached URL-scheme lookup purged by [`CallableTracker::reset`].
pub const CACHED_URL_SCHEME_KEY: &str = "sitesync_cached_url_scheme";

/// Why a pass ended without evaluating the diff loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither an admin-interactive nor a cron context.
    ContextDisallowed,
    /// The debounce lock was unexpired and no override was set.
    Debounced,
    /// The whitelist produced no entries to evaluate.
    NothingToEvaluate,
}

/// Result of a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    /// The pass ran to completion; `emitted` holds the names that were sent,
    /// in evaluation order (possibly empty).
    Completed { emitted: Vec<String> },
}

impl SyncOutcome {
    pub fn emitted(&self) -> &[String] {
        match self {
            Self::Completed { emitted } => emitted,
            Self::Skipped(_) => &[],
        }
    }
}

/// Checksum-debounced change tracker over a callable whitelist.
pub struct CallableTracker {
    whitelist: Whitelist,
    options: Arc<dyn OptionStore>,
    lock: DebounceLock,
    bus: Arc<EventBus>,
    identity: CurrentIdentity,
    elevated_actor: String,
}

impl CallableTracker {
    pub fn new(
        whitelist: Whitelist,
        options: Arc<dyn OptionStore>,
        transients: Arc<dyn TransientStore>,
        bus: Arc<EventBus>,
        window: Duration,
    ) -> Self {
        Self {
            whitelist,
            options,
            lock: DebounceLock::new(transients, window),
            bus,
            identity: CurrentIdentity::new(),
            elevated_actor: "sync-service".to_string(),
        }
    }

    /// Use `identity` for producers that require elevation, switching to
    /// `actor` while they run.
    pub fn with_identity(mut self, identity: CurrentIdentity, actor: impl Into<String>) -> Self {
        self.identity = identity;
        self.elevated_actor = actor.into();
        self
    }

    /// Names this tracker will evaluate, in evaluation order.
    pub fn tracked_names(&self) -> Vec<&str> {
        self.whitelist.names()
    }

    /// Whether the debounce lock is currently unexpired.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// The persisted name → checksum entries, in no particular order.
    pub fn stored_checksums(&self) -> Vec<(String, String)> {
        self.load_checksums()
            .into_iter()
            .filter_map(|(name, v)| v.as_str().map(|c| (name, c.to_string())))
            .collect()
    }

    /// Run one sync pass.
    ///
    /// Only admin-interactive and cron contexts may sync; cron passes are
    /// narrowed to the always-send subset. An unexpired debounce lock
    /// suppresses the pass unless the force-sync override option is set.
    /// Every evaluated callable ends the pass with a recorded checksum,
    /// changed or not, so checksum drift self-corrects next pass.
    pub fn evaluate_and_sync(&self, ctx: ExecContext) -> SyncResult<SyncOutcome> {
        if !ctx.is_admin() && !ctx.is_cron() {
            debug_event!("tracker", "skip", "context disallows sync");
            return Ok(SyncOutcome::Skipped(SkipReason::ContextDisallowed));
        }

        let narrowed;
        let whitelist = if ctx.is_cron() {
            narrowed = self.whitelist.narrowed_to(ALWAYS_SEND);
            &narrowed
        } else {
            &self.whitelist
        };

        let mut values: Vec<(String, Option<Value>)> = Vec::with_capacity(whitelist.len());
        for (name, producer, requires_elevation) in whitelist.iter() {
            let value = if requires_elevation {
                let _guard = self.identity.elevate(&self.elevated_actor);
                producer()
            } else {
                producer()
            };
            values.push((name.to_string(), value));
        }

        let forced = is_truthy(self.options.get(FORCE_SYNC_OPTION_KEY).as_ref());
        if !forced && self.lock.is_locked() {
            debug_event!("tracker", "skip", "debounce lock unexpired");
            return Ok(SyncOutcome::Skipped(SkipReason::Debounced));
        }
        if values.is_empty() {
            return Ok(SyncOutcome::Skipped(SkipReason::NothingToEvaluate));
        }

        self.lock.lock()?;
        if forced {
            // The override is one-shot: the pass it admits consumes it.
            self.options.delete(FORCE_SYNC_OPTION_KEY)?;
        }

        let mut checksums = self.load_checksums();
        let idc_active = is_truthy(self.options.get(IDC_MIGRATION_OPTION_KEY).as_ref());

        let mut emitted = Vec::new();
        for (name, value) in values {
            let Some(value) = value else {
                // Absent values are stable by definition, but their checksum
                // is still recorded so the first real value registers as a
                // change exactly once.
                checksums.insert(name, json!(stable_checksum(&Value::Null)));
                continue;
            };

            let current = stable_checksum(&value);
            let stored = checksums.get(&name).and_then(Value::as_str);
            let idc_override = idc_active && IDC_OVERRIDE.contains(&name.as_str());

            if idc_override || stored != Some(current.as_str()) {
                self.bus
                    .publish(TOPIC_CALLABLE_CHANGED, &[json!(name), value]);
                debug_event!("tracker", "emit", "{name}");
                emitted.push(name.clone());
            }
            checksums.insert(name, json!(current));
        }

        if !emitted.is_empty() {
            // Single write for the whole pass, not one per entry.
            self.options
                .set_raw(CHECKSUM_OPTION_KEY, Value::Object(checksums))?;
            log_event!("tracker", "synced", "{} callable(s)", emitted.len());
        }

        Ok(SyncOutcome::Completed { emitted })
    }

    /// Clear the debounce lock early so the next pass runs immediately.
    pub fn unlock(&self) -> SyncResult<()> {
        debug_event!("tracker", "unlock");
        self.lock.unlock()?;
        Ok(())
    }

    /// Unlock when an always-send option was updated or deleted.
    pub fn handle_option_event(&self, option_key: &str) -> SyncResult<()> {
        if ALWAYS_SEND_OPTIONS.contains(&option_key) {
            self.unlock()?;
        }
        Ok(())
    }

    /// Clear all tracker state: checksum store, debounce lock, and the
    /// cached URL-scheme lookup. Used on uninstall.
    pub fn reset(&self) -> SyncResult<()> {
        log_event!("tracker", "reset");
        self.options.delete(CHECKSUM_OPTION_KEY)?;
        self.options.delete(CACHED_URL_SCHEME_KEY)?;
        self.lock.unlock()?;
        Ok(())
    }

    /// Enqueue a full resync for an external orchestrator: one event carrying
    /// every tracked name. Returns the number of enqueued actions, which is
    /// always 1: callables are all-or-nothing.
    pub fn enqueue_full_sync(&self) -> usize {
        let names: Vec<Value> = self
            .whitelist
            .names()
            .into_iter()
            .map(|n| json!(n))
            .collect();
        self.bus.publish(TOPIC_FULL_SYNC, &names);
        log_event!("tracker", "full sync enqueued", "{} callable(s)", names.len());
        1
    }

    /// Remaining full-sync work, reported to the orchestrator. Constant 1
    /// until the enqueued action is consumed; completion is the
    /// orchestrator's to track.
    pub fn estimate_full_sync_actions(&self) -> usize {
        1
    }

    fn load_checksums(&self) -> Map<String, Value> {
        match self.options.get(CHECKSUM_OPTION_KEY) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Subscribe the tracker's unlock handling to option-change topics, so
/// always-send options clear the debounce lock as soon as they change.
pub fn attach_unlock_listeners(bus: &EventBus, tracker: Arc<CallableTracker>) {
    for topic in [TOPIC_OPTION_UPDATED, TOPIC_OPTION_DELETED] {
        let tracker = Arc::clone(&tracker);
        bus.subscribe(topic, move |args| {
            if let Some(key) = args.first().and_then(Value::as_str)
                && let Err(e) = tracker.handle_option_event(key)
            {
                tracing::warn!("[tracker] unlock on option change failed: {e}");
            }
        });
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "0" && s != "false",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use crate::store::MemoryStore;

    fn tracker_with(whitelist: Whitelist, window_ms: u64) -> (CallableTracker, ChannelSink) {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new());
        let sink = ChannelSink::attach(&bus, TOPIC_CALLABLE_CHANGED);
        let tracker = CallableTracker::new(
            whitelist,
            store.clone(),
            store,
            bus,
            Duration::from_millis(window_ms),
        );
        (tracker, sink)
    }

    #[test]
    fn test_frontend_context_skips() {
        let mut whitelist = Whitelist::new();
        whitelist.register("a", || Some(json!(1)));
        let (tracker, sink) = tracker_with(whitelist, 10_000);

        let outcome = tracker.evaluate_and_sync(ExecContext::Frontend).unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::ContextDisallowed));
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn test_empty_whitelist_skips_after_arming_nothing() {
        let (tracker, sink) = tracker_with(Whitelist::new(), 10_000);
        let outcome = tracker
            .evaluate_and_sync(ExecContext::AdminInteractive)
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::NothingToEvaluate));
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn test_force_sync_flag_is_one_shot() {
        let mut whitelist = Whitelist::new();
        whitelist.register("a", || Some(json!(1)));
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new());
        let tracker = CallableTracker::new(
            whitelist,
            store.clone(),
            store.clone(),
            bus,
            Duration::from_secs(300),
        );

        // First pass arms the lock.
        tracker
            .evaluate_and_sync(ExecContext::AdminInteractive)
            .unwrap();

        // Locked, no flag: suppressed.
        let outcome = tracker
            .evaluate_and_sync(ExecContext::AdminInteractive)
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Debounced));

        // Flag set: admitted once, then consumed.
        OptionStore::set(&*store, FORCE_SYNC_OPTION_KEY, json!(true)).unwrap();
        let outcome = tracker
            .evaluate_and_sync(ExecContext::AdminInteractive)
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Completed { .. }));
        assert!(OptionStore::get(&*store, FORCE_SYNC_OPTION_KEY).is_none());

        let outcome = tracker
            .evaluate_and_sync(ExecContext::AdminInteractive)
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Debounced));
    }

    #[test]
    fn test_cron_narrows_to_always_send() {
        let mut whitelist = Whitelist::new();
        whitelist.register("home_url", || Some(json!("https://example.com")));
        whitelist.register("blog_name", || Some(json!("Example")));
        let (tracker, sink) = tracker_with(whitelist, 10_000);

        let outcome = tracker.evaluate_and_sync(ExecContext::Cron).unwrap();
        assert_eq!(outcome.emitted(), ["home_url"]);

        let events = sink.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0][0], json!("home_url"));
    }

    #[test]
    fn test_elevation_wraps_flagged_producers() {
        let identity = CurrentIdentity::acting_as("editor");
        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut whitelist = Whitelist::new();
        {
            let identity = identity.clone();
            let observed = Arc::clone(&observed);
            whitelist.register_elevated("active_plugins", move || {
                observed.lock().push(identity.current());
                Some(json!(["a.php"]))
            });
        }
        {
            let identity = identity.clone();
            let observed = Arc::clone(&observed);
            whitelist.register("blog_name", move || {
                observed.lock().push(identity.current());
                Some(json!("Example"))
            });
        }

        let store = Arc::new(MemoryStore::new());
        let tracker = CallableTracker::new(
            whitelist,
            store.clone(),
            store,
            Arc::new(EventBus::new()),
            Duration::from_secs(300),
        )
        .with_identity(identity.clone(), "admin");

        tracker
            .evaluate_and_sync(ExecContext::AdminInteractive)
            .unwrap();

        let observed = observed.lock();
        assert_eq!(observed[0].as_deref(), Some("admin"));
        assert_eq!(observed[1].as_deref(), Some("editor"));
        // Restored after the pass.
        assert_eq!(identity.current().as_deref(), Some("editor"));
    }

    #[test]
    fn test_full_sync_pair() {
        let mut whitelist = Whitelist::new();
        whitelist.register("a", || Some(json!(1)));
        whitelist.register("b", || Some(json!(2)));

        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new());
        let sink = ChannelSink::attach(&bus, TOPIC_FULL_SYNC);
        let tracker =
            CallableTracker::new(whitelist, store.clone(), store, bus, Duration::from_secs(300));

        assert_eq!(tracker.estimate_full_sync_actions(), 1);
        assert_eq!(tracker.enqueue_full_sync(), 1);

        let events = sink.drain();
        assert_eq!(events, vec![vec![json!("a"), json!("b")]]);
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!(1))));
        assert!(is_truthy(Some(&json!("yes"))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&json!("0"))));
        assert!(!is_truthy(Some(&Value::Null)));
        assert!(!is_truthy(None));
    }
}
