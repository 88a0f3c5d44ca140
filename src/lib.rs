pub mod callables;
pub mod config;
pub mod context;
pub mod events;
pub mod logging;
pub mod store;
pub mod tracker;

pub use callables::{ALWAYS_SEND, ALWAYS_SEND_OPTIONS, IDC_OVERRIDE, Whitelist};
pub use config::Settings;
pub use context::{CurrentIdentity, ExecContext, IdentityGuard};
pub use events::{ChannelSink, EventBus};
pub use store::{JsonFileStore, MemoryStore, OptionStore, StoreError, TransientStore};
pub use tracker::{
    CallableTracker, SkipReason, SyncError, SyncOutcome, attach_unlock_listeners, stable_checksum,
};
