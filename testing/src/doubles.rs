//! Recording implementations of the channel and publisher contracts.
//!
//! Both wrap the runtime defaults, so a store built with them behaves
//! exactly like a default store while the test inspects the traffic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use unistate_core::{
    ActionChannel, ActionStream, ChannelError, Observer, StatePublisher, Subscription,
    SubscriptionId,
};
use unistate_runtime::{LatestActionChannel, ReplayPublisher};

/// State publisher that remembers every published state.
///
/// Clones share the same record and slot.
///
/// # Example
///
/// ```
/// use unistate_core::StatePublisher;
/// use unistate_testing::RecordingPublisher;
///
/// let publisher = RecordingPublisher::new(0);
/// publisher.publish(1);
/// publisher.publish(1);
///
/// assert_eq!(publisher.published(), vec![1, 1]);
/// assert_eq!(publisher.current(), 1);
/// ```
pub struct RecordingPublisher<S> {
    inner: ReplayPublisher<S>,
    published: Arc<Mutex<Vec<S>>>,
    clears: Arc<AtomicUsize>,
}

impl<S> RecordingPublisher<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create a publisher holding `initial`
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self {
            inner: ReplayPublisher::new(initial),
            published: Arc::new(Mutex::new(Vec::new())),
            clears: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every state passed to `publish`, in order
    #[must_use]
    pub fn published(&self) -> Vec<S> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times `clear` was called
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl<S> Clone for RecordingPublisher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            published: Arc::clone(&self.published),
            clears: Arc::clone(&self.clears),
        }
    }
}

impl<S> StatePublisher<S> for RecordingPublisher<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn current(&self) -> S {
        self.inner.current()
    }

    fn publish(&self, state: S) {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state.clone());
        self.inner.publish(state);
    }

    fn subscribe(&self, observer: Observer<S>) -> Subscription {
        self.inner.subscribe(observer)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id);
    }

    fn observer_count(&self) -> usize {
        self.inner.observer_count()
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear();
    }
}

impl<S> std::fmt::Debug for RecordingPublisher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingPublisher")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

/// Action channel that remembers every accepted dispatch.
///
/// Dispatches made after `close` are counted as ignored and not recorded.
pub struct RecordingChannel<A> {
    inner: LatestActionChannel<A>,
    dispatched: Mutex<Vec<A>>,
    ignored: AtomicUsize,
    consumers: AtomicUsize,
}

impl<A> RecordingChannel<A>
where
    A: Clone + Send + 'static,
{
    /// Create an open channel with no consumer
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: LatestActionChannel::new(),
            dispatched: Mutex::new(Vec::new()),
            ignored: AtomicUsize::new(0),
            consumers: AtomicUsize::new(0),
        }
    }

    /// Every action accepted by `dispatch`, in order
    #[must_use]
    pub fn dispatched(&self) -> Vec<A> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Dispatches that arrived after `close`
    #[must_use]
    pub fn ignored_count(&self) -> usize {
        self.ignored.load(Ordering::SeqCst)
    }

    /// Successful `consume` calls
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.load(Ordering::SeqCst)
    }
}

impl<A> ActionChannel<A> for RecordingChannel<A>
where
    A: Clone + Send + 'static,
{
    fn dispatch(&self, action: A) {
        if self.inner.is_closed() {
            self.ignored.fetch_add(1, Ordering::SeqCst);
            return;
        }
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action.clone());
        self.inner.dispatch(action);
    }

    fn consume(&self) -> Result<ActionStream<A>, ChannelError> {
        let actions = self.inner.consume()?;
        self.consumers.fetch_add(1, Ordering::SeqCst);
        Ok(actions)
    }

    fn latest(&self) -> Option<A> {
        self.inner.latest()
    }

    fn close(&self) {
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<A> Default for RecordingChannel<A>
where
    A: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for RecordingChannel<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingChannel")
            .field("ignored", &self.ignored.load(Ordering::SeqCst))
            .field("consumers", &self.consumers.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
