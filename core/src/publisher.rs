//! The state publisher contract.
//!
//! A publisher is a single-slot broadcast primitive: it caches the latest
//! state and notifies an ordered list of observers on every publish.
//!
//! # Guarantees
//!
//! - [`StatePublisher::subscribe`] invokes the observer with the current
//!   state before returning, then on every later publish, in publish order.
//! - [`StatePublisher::publish`] notifies all observers synchronously, in
//!   subscription order, before returning.
//! - Notification rounds never interleave.

use std::fmt;
use std::sync::Arc;

/// Callback invoked with every published state.
pub type Observer<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// Identifies one registered observer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Create an id from a raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle to a registered observer.
///
/// Dropping the handle leaves the observer registered. Call
/// [`unsubscribe`](Self::unsubscribe) to stop notifications.
#[must_use = "dropping a Subscription keeps the observer registered; call `unsubscribe` to stop it"]
pub struct Subscription {
    id: SubscriptionId,
    cancel: Option<Box<dyn FnOnce(SubscriptionId) + Send>>,
}

impl Subscription {
    /// Create a handle that runs `cancel` when unsubscribed
    pub fn new<F>(id: SubscriptionId, cancel: F) -> Self
    where
        F: FnOnce(SubscriptionId) + Send + 'static,
    {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Create a handle with nothing to cancel
    ///
    /// Used when the publisher is already gone at subscribe time.
    pub const fn detached(id: SubscriptionId) -> Self {
        Self { id, cancel: None }
    }

    /// The id of the registered observer
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop further notifications to this observer
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Replay-latest holder of the current state.
///
/// # Reentrancy
///
/// Observers may call any method of the publisher that is notifying them.
/// A [`subscribe`](Self::subscribe) made from a notification replays the
/// current state at once. A [`publish`](Self::publish) made from a
/// notification is delivered after the running round completes, so every
/// observer sees the outer state before the nested one.
pub trait StatePublisher<S>: Send + Sync {
    /// The latest published state, or the initial state if none
    fn current(&self) -> S;

    /// Set the current state and notify every observer
    fn publish(&self, state: S);

    /// Register an observer; it is invoked with [`current`](Self::current)
    /// before this returns
    fn subscribe(&self, observer: Observer<S>) -> Subscription;

    /// Remove an observer. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Number of registered observers
    fn observer_count(&self) -> usize;

    /// Detach every observer
    fn clear(&self);
}
