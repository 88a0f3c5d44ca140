//! The whitelist of tracked value producers.
//!
//! A callable is a named, zero-argument producer of a serializable value,
//! evaluated lazily once per sync pass. The whitelist is assembled once per
//! process: a base set of site-state producers plus conditional additions
//! (network-wide entries on multisite installs). Names are unique; iteration
//! follows registration order.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::store::OptionStore;

/// Zero-argument value producer. `None` models an absent/null value.
pub type Producer = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// Callables whose backing options must propagate without waiting out the
/// debounce window. Updating or deleting one of these options unlocks the
/// tracker, and cron-triggered passes evaluate only this subset.
pub const ALWAYS_SEND: &[&str] = &["home_url", "site_url", "active_plugins"];

/// The durable option keys backing [`ALWAYS_SEND`], in the same order.
/// Option-change events carry option keys, not callable names, so the unlock
/// path matches against these.
pub const ALWAYS_SEND_OPTIONS: &[&str] = &["home", "siteurl", "active_plugins"];

/// Site-identity callables re-sent even with unchanged checksums while an
/// identity-migration flag is active, so a migrated clone re-announces who
/// it is.
pub const IDC_OVERRIDE: &[&str] = &["home_url", "site_url"];

struct Entry {
    name: String,
    producer: Producer,
    requires_elevation: bool,
}

/// Ordered name → producer mapping with unique names.
#[derive(Default)]
pub struct Whitelist {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer under `name`.
    ///
    /// Re-registering an existing name replaces its producer in place,
    /// keeping the original position.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        producer: impl Fn() -> Option<Value> + Send + Sync + 'static,
    ) -> &mut Self {
        self.insert(name.into(), Arc::new(producer), false);
        self
    }

    /// Register a producer that must run under the elevated actor.
    pub fn register_elevated(
        &mut self,
        name: impl Into<String>,
        producer: impl Fn() -> Option<Value> + Send + Sync + 'static,
    ) -> &mut Self {
        self.insert(name.into(), Arc::new(producer), true);
        self
    }

    fn insert(&mut self, name: String, producer: Producer, requires_elevation: bool) {
        if let Some(&pos) = self.index.get(&name) {
            self.entries[pos] = Entry {
                name,
                producer,
                requires_elevation,
            };
        } else {
            self.index.insert(name.clone(), self.entries.len());
            self.entries.push(Entry {
                name,
                producer,
                requires_elevation,
            });
        }
    }

    /// Remove a name from the whitelist. Unknown names are ignored.
    pub fn remove(&mut self, name: &str) {
        if let Some(pos) = self.index.remove(name) {
            self.entries.remove(pos);
            for entry in &self.entries[pos..] {
                if let Some(idx) = self.index.get_mut(&entry.name) {
                    *idx -= 1;
                }
            }
        }
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, producer, requires_elevation)` in registration order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Producer, bool)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), &e.producer, e.requires_elevation))
    }

    /// A whitelist holding only the named subset, preserving this list's
    /// order. Producers are shared, not re-built. Used for cron narrowing.
    pub fn narrowed_to(&self, names: &[&str]) -> Whitelist {
        let mut narrowed = Whitelist::new();
        for entry in &self.entries {
            if names.contains(&entry.name.as_str()) {
                narrowed.insert(
                    entry.name.clone(),
                    Arc::clone(&entry.producer),
                    entry.requires_elevation,
                );
            }
        }
        narrowed
    }

    /// The standard site-state producer set, reading from `options`.
    ///
    /// `multisite` adds the network-wide entries that only exist on
    /// multi-site installs.
    pub fn standard(options: Arc<dyn OptionStore>, multisite: bool) -> Self {
        fn from_option(options: &Arc<dyn OptionStore>, key: &'static str) -> Producer {
            let options = Arc::clone(options);
            Arc::new(move || options.get(key))
        }

        let mut list = Whitelist::new();
        list.insert("home_url".into(), from_option(&options, "home"), false);
        list.insert("site_url".into(), from_option(&options, "siteurl"), false);
        list.insert("blog_name".into(), from_option(&options, "blogname"), false);
        // Reading the plugin list needs the privileged actor on the host.
        list.insert(
            "active_plugins".into(),
            from_option(&options, "active_plugins"),
            true,
        );
        list.insert(
            "active_theme".into(),
            from_option(&options, "template"),
            false,
        );
        list.insert(
            "timezone".into(),
            from_option(&options, "timezone_string"),
            false,
        );
        list.insert(
            "paused_plugins".into(),
            from_option(&options, "paused_plugins"),
            false,
        );

        if multisite {
            list.insert(
                "network_name".into(),
                from_option(&options, "network_name"),
                false,
            );
            list.insert(
                "network_site_url".into(),
                from_option(&options, "network_siteurl"),
                false,
            );
            list.insert(
                "main_network_site".into(),
                from_option(&options, "main_network_site"),
                false,
            );
        }

        list
    }
}
