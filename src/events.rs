//! Named-topic publish/subscribe dispatcher.
//!
//! Replaces the host's global action hooks with an explicit bus: handlers are
//! subscribed to string topics and invoked in subscription order with
//! positional JSON arguments. Publishing is fire-and-forget; there is no
//! return channel and no unsubscribe.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, unbounded};
use parking_lot::RwLock;
use serde_json::Value;

type Handler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Topic published once per changed callable, args `[name, value]`.
pub const TOPIC_CALLABLE_CHANGED: &str = "callable_changed";

/// Topic published once per full-sync enqueue, args are the whitelist names.
pub const TOPIC_FULL_SYNC: &str = "full_sync_callables";

/// Topic hosts publish when a durable option is written, args `[key]`.
pub const TOPIC_OPTION_UPDATED: &str = "option_updated";

/// Topic hosts publish when a durable option is removed, args `[key]`.
pub const TOPIC_OPTION_DELETED: &str = "option_deleted";

/// Fire-and-forget event dispatcher with ordered handler lists per topic.
#[derive(Default)]
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to a topic's list. Handlers run in subscription order.
    pub fn subscribe(&self, topic: &str, handler: impl Fn(&[Value]) + Send + Sync + 'static) {
        self.topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Invoke every handler subscribed to `topic`, in order.
    ///
    /// Handlers are cloned out of the registry before invocation so a handler
    /// may itself subscribe or publish without deadlocking.
    pub fn publish(&self, topic: &str, args: &[Value]) {
        let handlers: Vec<Handler> = self
            .topics
            .read()
            .get(topic)
            .map(|list| list.to_vec())
            .unwrap_or_default();

        tracing::debug!("[bus] publish {}: {} handler(s)", topic, handlers.len());
        for handler in handlers {
            handler(args);
        }
    }

    /// Number of handlers currently subscribed to `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, |l| l.len())
    }
}

/// Bridges a topic onto a channel so tests and the CLI can observe events
/// without writing a handler by hand.
pub struct ChannelSink {
    receiver: Receiver<Vec<Value>>,
}

impl ChannelSink {
    /// Subscribe a forwarding handler to `topic` on `bus`.
    pub fn attach(bus: &EventBus, topic: &str) -> Self {
        let (tx, rx) = unbounded();
        bus.subscribe(topic, move |args| {
            // Receiver dropped means nobody is watching anymore; fine.
            let _ = tx.send(args.to_vec());
        });
        Self { receiver: rx }
    }

    /// All events received so far, oldest first.
    pub fn drain(&self) -> Vec<Vec<Value>> {
        self.receiver.try_iter().collect()
    }

    pub fn receiver(&self) -> &Receiver<Vec<Value>> {
        &self.receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe("topic", move |_| order.write().push(tag));
        }

        bus.publish("topic", &[]);
        assert_eq!(*order.read(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish("nobody_listens", &[json!(1)]);
        assert_eq!(bus.handler_count("nobody_listens"), 0);
    }

    #[test]
    fn test_args_are_positional() {
        let bus = EventBus::new();
        let sink = ChannelSink::attach(&bus, TOPIC_CALLABLE_CHANGED);

        bus.publish(TOPIC_CALLABLE_CHANGED, &[json!("home_url"), json!("https://a")]);

        let events = sink.drain();
        assert_eq!(events, vec![vec![json!("home_url"), json!("https://a")]]);
    }

    #[test]
    fn test_handler_may_publish_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));

        {
            let publisher = Arc::clone(&bus);
            bus.subscribe("outer", move |_| publisher.publish("inner", &[]));
        }
        {
            let hits = Arc::clone(&hits);
            bus.subscribe("inner", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish("outer", &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
