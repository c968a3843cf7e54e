//! Default action channel.

use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use unistate_core::{ActionChannel, ActionStream, ChannelError};

/// Action channel that keeps only the latest action until a consumer attaches.
///
/// While no consumer is attached, each dispatch supersedes the previous
/// pending action. When the consumer attaches, the pending action (if any)
/// is delivered first, and from then on every dispatch is forwarded in
/// order through an unbounded queue, so `dispatch` never blocks.
///
/// [`close`](ActionChannel::close) ends the consumer stream at once: actions
/// still queued are dropped, not delivered.
///
/// # Example
///
/// ```
/// use futures::StreamExt;
/// use unistate_core::ActionChannel;
/// use unistate_runtime::LatestActionChannel;
///
/// # tokio_test::block_on(async {
/// let channel = LatestActionChannel::new();
/// channel.dispatch("stale");
/// channel.dispatch("fresh");
///
/// let mut actions = channel.consume()?;
/// channel.dispatch("live");
/// assert_eq!(actions.next().await, Some("fresh"));
/// assert_eq!(actions.next().await, Some("live"));
/// # Ok::<(), unistate_core::ChannelError>(())
/// # });
/// ```
pub struct LatestActionChannel<A> {
    inner: Mutex<Inner<A>>,
    // Shared with consumer streams, which stop yielding once it is set
    closed: Arc<AtomicBool>,
}

struct Inner<A> {
    latest: Option<A>,
    pending: Option<A>,
    consumer: Option<mpsc::UnboundedSender<A>>,
}

impl<A> LatestActionChannel<A> {
    /// Create an open channel with no consumer
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                latest: None,
                pending: None,
                consumer: None,
            }),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a live consumer is attached
    #[must_use]
    pub fn has_consumer(&self) -> bool {
        self.lock()
            .consumer
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<A>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A> Default for LatestActionChannel<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> ActionChannel<A> for LatestActionChannel<A>
where
    A: Clone + Send + 'static,
{
    fn dispatch(&self, action: A) {
        let mut inner = self.lock();
        if self.is_closed() {
            tracing::trace!("Ignoring dispatch on closed channel");
            return;
        }

        inner.latest = Some(action.clone());

        let undelivered = match inner.consumer.as_ref() {
            Some(tx) => tx.send(action).err().map(|mpsc::error::SendError(action)| action),
            None => Some(action),
        };

        if let Some(action) = undelivered {
            // Consumer gone or never attached: keep only the newest
            inner.consumer = None;
            inner.pending = Some(action);
        }
    }

    fn consume(&self) -> Result<ActionStream<A>, ChannelError> {
        let mut inner = self.lock();
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        if inner.consumer.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(ChannelError::AlreadyConsumed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(pending) = inner.pending.take() {
            // Receiver is alive in this scope
            let _ = tx.send(pending);
        }
        inner.consumer = Some(tx);

        let closed = Arc::clone(&self.closed);
        Ok(futures::stream::unfold(rx, move |mut rx| {
            let closed = Arc::clone(&closed);
            async move {
                let action = rx.recv().await?;
                (!closed.load(Ordering::Acquire)).then_some((action, rx))
            }
        })
        .boxed())
    }

    fn latest(&self) -> Option<A> {
        self.lock().latest.clone()
    }

    fn close(&self) {
        let mut inner = self.lock();
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Closing action channel");
        }
        inner.pending = None;
        // Dropping the sender ends the consumer stream
        inner.consumer = None;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<A> std::fmt::Debug for LatestActionChannel<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("LatestActionChannel")
            .field("has_pending", &inner.pending.is_some())
            .field("has_consumer", &inner.consumer.is_some())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
