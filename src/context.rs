//! Execution context and scoped identity switching.
//!
//! Sync passes behave differently depending on what kind of request triggered
//! them, and some value producers need to run as a privileged actor. Both host
//! concerns are modeled explicitly here instead of being read from globals.

use std::sync::Arc;

use parking_lot::Mutex;

/// The kind of request driving the current pass.
///
/// Policy: only admin-interactive and cron contexts may trigger sync. Cron
/// runs are narrowed to the always-send subset; anything else skips entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecContext {
    /// An interactive admin request.
    AdminInteractive,
    /// A background/cron run with no interactive user.
    Cron,
    /// Any other request (frontend page view, API hit).
    Frontend,
}

impl ExecContext {
    pub fn is_admin(self) -> bool {
        self == Self::AdminInteractive
    }

    pub fn is_cron(self) -> bool {
        self == Self::Cron
    }
}

/// The actor the current pass runs as.
///
/// Cloning shares the underlying slot, so a tracker and the code driving it
/// observe the same identity.
#[derive(Clone, Default)]
pub struct CurrentIdentity {
    actor: Arc<Mutex<Option<String>>>,
}

impl CurrentIdentity {
    /// Anonymous identity (no actor).
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity already holding `actor`.
    pub fn acting_as(actor: impl Into<String>) -> Self {
        let identity = Self::new();
        *identity.actor.lock() = Some(actor.into());
        identity
    }

    pub fn current(&self) -> Option<String> {
        self.actor.lock().clone()
    }

    /// Switch to `actor` for the lifetime of the returned guard.
    ///
    /// The previous actor is restored when the guard drops, on every exit
    /// path including unwinding out of a failed producer.
    #[must_use = "dropping the guard immediately restores the previous identity"]
    pub fn elevate(&self, actor: impl Into<String>) -> IdentityGuard {
        let previous = self.actor.lock().replace(actor.into());
        IdentityGuard {
            identity: self.clone(),
            previous,
        }
    }
}

/// Restores the prior identity on drop. See [`CurrentIdentity::elevate`].
pub struct IdentityGuard {
    identity: CurrentIdentity,
    previous: Option<String>,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        *self.identity.actor.lock() = self.previous.take();
    }
}
