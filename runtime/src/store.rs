//! The Store: a reducer wired to an action channel, a state publisher and a
//! lifecycle.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::health::HealthCheck;
use crate::lifecycle::{CancellationScope, Lifecycle, PipelineStatus};
use crate::metrics::{ACTIONS_DISPATCHED, ACTIONS_IGNORED};
use crate::pipeline::Pipeline;
use crate::{LatestActionChannel, ReplayPublisher, StateStream};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::Instrument;
use unistate_core::{ActionChannel, Observer, Reducer, StateBinding, StatePublisher, Subscription};

/// The Store: owns the serialized pipeline for one reducer.
///
/// The store is inert until [`attach`](Self::attach)ed to a host's
/// [`CancellationScope`]. From then on it processes dispatched actions one
/// at a time until it is detached, the scope is cancelled, or `reduce` fails.
///
/// # Type Parameters
///
/// - `R`: The reducer; its associated types fix the action, data and state
///   types
///
/// # Example
///
/// ```
/// use unistate_core::{effect, reducer, Output, OutputStream, ReduceFuture, Reducer};
/// use unistate_runtime::{CancellationScope, Store};
/// use std::time::Duration;
///
/// #[derive(Clone, Debug)]
/// struct Increment;
///
/// struct Counter;
///
/// impl Reducer for Counter {
///     type Action = Increment;
///     type Data = i64;
///     type State = i64;
///     type Error = std::convert::Infallible;
///
///     fn initial_state(&self) -> i64 {
///         0
///     }
///
///     fn perform(&self, action: Increment) -> OutputStream<'_, Increment, i64, Self::Error> {
///         effect::just(Output::with_data(action, 1))
///     }
///
///     fn reduce(
///         &self,
///         _: Increment,
///         state: i64,
///         data: Option<i64>,
///     ) -> ReduceFuture<'_, i64, Self::Error> {
///         reducer::ready(state + data.unwrap_or_default())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), unistate_runtime::StoreError> {
/// let scope = CancellationScope::new();
/// let store = Store::new(Counter);
/// store.attach(&scope)?;
///
/// let state = store
///     .dispatch_and_wait_for(Increment, |s| *s == 1, Duration::from_secs(1))
///     .await?;
/// assert_eq!(state, 1);
///
/// scope.cancel();
/// # Ok(())
/// # }
/// ```
pub struct Store<R>
where
    R: Reducer,
{
    reducer: Arc<R>,
    channel: Arc<dyn ActionChannel<R::Action>>,
    publisher: Arc<dyn StatePublisher<R::State>>,
    binding: Mutex<Option<StateBinding<R::State>>>,
    config: StoreConfig,
    label: Arc<str>,
    lifecycle: Lifecycle,
}

impl<R> Store<R>
where
    R: Reducer + 'static,
{
    /// Create a store with the default channel, publisher and config
    #[must_use]
    pub fn new(reducer: R) -> Self {
        Self::from_shared(Arc::new(reducer))
    }

    /// Create a store around a reducer that is shared elsewhere
    #[must_use]
    pub fn from_shared(reducer: Arc<R>) -> Self {
        let initial = reducer.initial_state();
        Self::assemble(
            reducer,
            Arc::new(LatestActionChannel::new()),
            Arc::new(ReplayPublisher::new(initial)),
            StoreConfig::default(),
        )
    }

    /// Create a store with custom configuration
    #[must_use]
    pub fn with_config(reducer: R, config: StoreConfig) -> Self {
        let initial = reducer.initial_state();
        Self::assemble(
            Arc::new(reducer),
            Arc::new(LatestActionChannel::new()),
            Arc::new(ReplayPublisher::new(initial)),
            config,
        )
    }

    /// Create a store over a caller-supplied channel and publisher
    ///
    /// The pipeline starts from `publisher.current()`, not from
    /// [`Reducer::initial_state`].
    #[must_use]
    pub fn with_parts(
        reducer: R,
        channel: Arc<dyn ActionChannel<R::Action>>,
        publisher: Arc<dyn StatePublisher<R::State>>,
    ) -> Self {
        Self::assemble(Arc::new(reducer), channel, publisher, StoreConfig::default())
    }

    fn assemble(
        reducer: Arc<R>,
        channel: Arc<dyn ActionChannel<R::Action>>,
        publisher: Arc<dyn StatePublisher<R::State>>,
        config: StoreConfig,
    ) -> Self {
        let label = Arc::from(config.label());
        Self {
            reducer,
            channel,
            publisher,
            binding: Mutex::new(None),
            config,
            label,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Transform the reduced state stream before it reaches the publisher.
    ///
    /// The binding is applied once, when the store is attached. `reduce`
    /// keeps folding over the unbound states.
    #[must_use]
    pub fn with_binding<F>(mut self, binding: F) -> Self
    where
        F: FnOnce(BoxStream<'static, R::State>) -> BoxStream<'static, R::State> + Send + 'static,
    {
        *self
            .binding
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(binding));
        self
    }

    /// Start the pipeline, bound to `scope`.
    ///
    /// Cancelling `scope` has the same effect as [`detach`](Self::detach).
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyAttached`] if the store is running
    /// - [`StoreError::Detached`] if the store was already torn down
    /// - [`StoreError::Channel`] if the action channel refuses a consumer
    /// - [`StoreError::NoRuntime`] if called outside a Tokio runtime
    pub fn attach(&self, scope: &CancellationScope) -> Result<(), StoreError> {
        match self.lifecycle.status() {
            PipelineStatus::Idle => {},
            PipelineStatus::Running => return Err(StoreError::AlreadyAttached),
            PipelineStatus::Stopped | PipelineStatus::Failed(_) => {
                return Err(StoreError::Detached);
            },
        }
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let actions = self.channel.consume()?;

        let mut pipeline = Pipeline::new(Arc::clone(&self.reducer), Arc::clone(&self.publisher))
            .with_label(Arc::clone(&self.label))
            .with_cancellation(scope.clone())
            .with_cancellation(self.lifecycle.stop_signal());
        let binding = self
            .binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(binding) = binding {
            pipeline = pipeline.with_binding(binding);
        }

        let span = tracing::info_span!("store", label = %self.label);
        let channel = Arc::clone(&self.channel);
        let publisher = Arc::clone(&self.publisher);
        self.lifecycle.start(
            &runtime,
            scope,
            pipeline.run(actions).instrument(span),
            move |outcome| {
                channel.close();
                // A failed store keeps its observers so they can read the last state
                if !matches!(outcome, PipelineStatus::Failed(_)) {
                    publisher.clear();
                }
            },
        )?;

        tracing::info!(store = %self.label, "Store attached");
        Ok(())
    }

    /// Dispatch an action and wait for a state matching `predicate`.
    ///
    /// Subscribes before dispatching, so a state published by this action
    /// cannot be missed. The state current at the time of the call is not
    /// tested.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`] if no matching state arrives within `timeout`
    /// - [`StoreError::StatesClosed`] if the store is detached while waiting
    /// - The halting error if the pipeline fails while waiting
    /// - [`StoreError::Detached`] (or the halting error) if the store has
    ///   already ended
    pub async fn dispatch_and_wait_for<F>(
        &self,
        action: R::Action,
        predicate: F,
        timeout: Duration,
    ) -> Result<R::State, StoreError>
    where
        F: Fn(&R::State) -> bool,
    {
        match self.lifecycle.status() {
            PipelineStatus::Failed(error) => return Err(error),
            PipelineStatus::Stopped => return Err(StoreError::Detached),
            PipelineStatus::Idle | PipelineStatus::Running => {},
        }

        let mut states = self.states();
        // Replay of the state before dispatch
        let _ = states.next().await;
        self.dispatch(action);

        let matching = async {
            while let Some(state) = states.next().await {
                if predicate(&state) {
                    return Ok(state);
                }
            }
            Err(StoreError::StatesClosed)
        };

        let wait = async {
            tokio::select! {
                biased;

                result = matching => result,
                status = self.lifecycle.terminated() => {
                    Err(status.error().cloned().unwrap_or(StoreError::StatesClosed))
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

impl<R> Store<R>
where
    R: Reducer,
{
    /// Hand an action to the pipeline.
    ///
    /// Never blocks and never fails. Ignored once the store is torn down.
    pub fn dispatch(&self, action: R::Action) {
        dispatch_to(self.channel.as_ref(), &self.label, action);
    }

    /// A cloneable handle that dispatches into this store
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher<R::Action> {
        Dispatcher {
            channel: Arc::clone(&self.channel),
            label: Arc::clone(&self.label),
        }
    }

    /// The most recently dispatched action
    #[must_use]
    pub fn latest_action(&self) -> Option<R::Action> {
        self.channel.latest()
    }

    /// The latest published state
    #[must_use]
    pub fn current(&self) -> R::State {
        self.publisher.current()
    }

    /// Register a callback for every published state.
    ///
    /// `observer` is called with the current state before this returns.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&R::State) + Send + Sync + 'static,
    {
        self.subscribe_observer(Arc::new(observer))
    }

    /// Register an already shared observer
    pub fn subscribe_observer(&self, observer: Observer<R::State>) -> Subscription {
        self.publisher.subscribe(observer)
    }

    /// Published states as an async stream, starting with the current one
    #[must_use]
    pub fn states(&self) -> StateStream<R::State> {
        StateStream::new(self.publisher.as_ref())
    }

    /// Number of registered observers
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.publisher.observer_count()
    }

    /// Tear the store down.
    ///
    /// Stops the pipeline, closes the action channel and detaches every
    /// observer. Actions still queued are dropped. Safe to call from an
    /// observer. Idempotent. A detached store cannot be attached again.
    pub fn detach(&self) {
        let stopped = self.lifecycle.stop();
        self.channel.close();
        self.publisher.clear();
        if stopped {
            tracing::info!(store = %self.label, "Store detached");
        }
    }

    /// Where the pipeline is in its life
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.lifecycle.status()
    }

    /// Whether the pipeline is processing actions
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Resolve with the terminal status once the store has ended
    pub async fn terminated(&self) -> PipelineStatus {
        self.lifecycle.terminated().await
    }

    /// The store's configuration
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Report the store's health.
    ///
    /// - Running: healthy
    /// - Not attached yet, or detached: degraded
    /// - Halted by an error: unhealthy
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        HealthCheck::for_pipeline(self.config.label(), &self.status(), self.observer_count())
    }
}

impl<R> Drop for Store<R>
where
    R: Reducer,
{
    fn drop(&mut self) {
        self.detach();
    }
}

impl<R> fmt::Debug for Store<R>
where
    R: Reducer,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.label)
            .field("status", &self.lifecycle.status())
            .field("observers", &self.publisher.observer_count())
            .finish_non_exhaustive()
    }
}

/// Cloneable dispatch-only handle to a [`Store`].
///
/// Keeps the action channel alive, not the store: once the store is torn
/// down, dispatches through the handle are ignored.
pub struct Dispatcher<A> {
    channel: Arc<dyn ActionChannel<A>>,
    label: Arc<str>,
}

impl<A> Dispatcher<A> {
    /// Hand an action to the pipeline
    pub fn dispatch(&self, action: A) {
        dispatch_to(self.channel.as_ref(), &self.label, action);
    }

    /// Whether the store behind this handle was torn down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

impl<A> Clone for Dispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            label: Arc::clone(&self.label),
        }
    }
}

impl<A> fmt::Debug for Dispatcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("label", &self.label)
            .field("closed", &self.channel.is_closed())
            .finish()
    }
}

// The channel itself drops dispatches after close; this only decides which
// counter moves.
fn dispatch_to<A>(channel: &dyn ActionChannel<A>, label: &str, action: A) {
    if channel.is_closed() {
        metrics::counter!(ACTIONS_IGNORED, "store" => label.to_string()).increment(1);
        tracing::trace!(store = %label, "Dispatch ignored, store is torn down");
    } else {
        metrics::counter!(ACTIONS_DISPATCHED, "store" => label.to_string()).increment(1);
    }
    channel.dispatch(action);
}
