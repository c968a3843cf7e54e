//! # Counter Example
//!
//! A counter demonstrating the Unistate engine.
//!
//! This example showcases:
//! - A reducer whose `perform` is asynchronous and emits several outputs
//! - Effect failures as an empty output sequence (`LoadBroken`)
//! - A fatal `reduce` failure (`i64` overflow halts the store)
//! - A host view-model that owns a cancellation scope and a store
//!
//! ## Example
//!
//! ```no_run
//! use counter::{CounterAction, CounterReducer, CounterViewModel};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), unistate_runtime::StoreError> {
//! let view_model = CounterViewModel::new(CounterReducer::new())?;
//! let state = view_model
//!     .store()
//!     .dispatch_and_wait_for(CounterAction::Increment, |s| s.count == 1, Duration::from_secs(1))
//!     .await?;
//! assert_eq!(state.count, 1);
//! view_model.on_cleared();
//! # Ok(())
//! # }
//! ```

use futures::stream::BoxStream;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use unistate_core::{Output, OutputStream, ReduceFuture, Reducer, Subscription, effect, reducer};
use unistate_runtime::{CancellationScope, StateStream, Store, StoreConfig, StoreError};

/// Counter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
    /// Whether a `Load` is in flight
    pub loading: bool,
}

impl fmt::Display for CounterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.loading {
            write!(f, "count={} (loading)", self.count)
        } else {
            write!(f, "count={}", self.count)
        }
    }
}

/// Counter actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterAction {
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// Add an arbitrary amount
    Add(i64),
    /// Fetch an amount from the (simulated) counter source and add it
    Load,
    /// Like `Load`, but the source is down
    LoadBroken,
    /// Reset the counter to 0
    Reset,
}

/// Payloads carried from `perform` to `reduce`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterData {
    /// Change the count by this amount
    Delta(i64),
    /// A load has started
    Loading,
    /// A load finished with this amount
    Loaded(i64),
}

/// Counter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    /// Applying a delta would overflow `i64`
    #[error("counter overflowed applying {delta} to {count}")]
    Overflow {
        /// Count before the change
        count: i64,
        /// The change that failed
        delta: i64,
    },

    /// The counter source could not be reached
    #[error("counter source unavailable")]
    Unavailable,
}

/// Counter reducer
///
/// `Load` simulates a slow source: it reports `Loading`, waits
/// `load_delay`, then reports `load_amount`.
#[derive(Debug, Clone)]
pub struct CounterReducer {
    load_amount: i64,
    load_delay: Duration,
}

impl CounterReducer {
    /// Amount returned by `Load` unless configured otherwise
    pub const DEFAULT_LOAD_AMOUNT: i64 = 10;

    /// Create a reducer with the default load behaviour
    #[must_use]
    pub const fn new() -> Self {
        Self {
            load_amount: Self::DEFAULT_LOAD_AMOUNT,
            load_delay: Duration::from_millis(50),
        }
    }

    /// Configure what `Load` returns and how long it takes
    #[must_use]
    pub const fn with_load(mut self, amount: i64, delay: Duration) -> Self {
        self.load_amount = amount;
        self.load_delay = delay;
        self
    }

    fn apply(state: CounterState, delta: i64) -> Result<CounterState, CounterError> {
        let count = state.count.checked_add(delta).ok_or(CounterError::Overflow {
            count: state.count,
            delta,
        })?;
        Ok(CounterState { count, ..state })
    }
}

impl Default for CounterReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for CounterReducer {
    type Action = CounterAction;
    type Data = CounterData;
    type State = CounterState;
    type Error = CounterError;

    fn initial_state(&self) -> CounterState {
        CounterState::default()
    }

    fn perform(
        &self,
        action: CounterAction,
    ) -> OutputStream<'_, CounterAction, CounterData, CounterError> {
        match action {
            CounterAction::Increment => {
                effect::just(Output::with_data(action, CounterData::Delta(1)))
            },
            CounterAction::Decrement => {
                effect::just(Output::with_data(action, CounterData::Delta(-1)))
            },
            CounterAction::Add(amount) => {
                effect::just(Output::with_data(action, CounterData::Delta(amount)))
            },
            CounterAction::Reset => effect::just(Output::empty(action)),
            CounterAction::Load => {
                let amount = self.load_amount;
                let delay = self.load_delay;
                Box::pin(async_stream::try_stream! {
                    yield Output::with_data(CounterAction::Load, CounterData::Loading);
                    tokio::time::sleep(delay).await;
                    tracing::debug!(amount, "Counter source answered");
                    yield Output::with_data(CounterAction::Load, CounterData::Loaded(amount));
                })
            },
            CounterAction::LoadBroken => effect::fail(CounterError::Unavailable),
        }
    }

    fn reduce(
        &self,
        action: CounterAction,
        state: CounterState,
        data: Option<CounterData>,
    ) -> ReduceFuture<'_, CounterState, CounterError> {
        let next = match (action, data) {
            (CounterAction::Reset, _) => Ok(CounterState::default()),
            (_, Some(CounterData::Delta(delta))) => Self::apply(state, delta),
            (_, Some(CounterData::Loading)) => Ok(CounterState {
                loading: true,
                ..state
            }),
            (_, Some(CounterData::Loaded(amount))) => {
                Self::apply(state, amount).map(|state| CounterState {
                    loading: false,
                    ..state
                })
            },
            (_, None) => Ok(state),
        };

        match next {
            Ok(state) => reducer::ready(state),
            Err(error) => reducer::reject(error),
        }
    }
}

/// Published counter states, as seen by a binding
pub type States = BoxStream<'static, CounterState>;

/// Drop states equal to the one published just before them.
///
/// `seed` is the state already published when the binding starts.
/// Installed by [`CounterViewModel`] as its state binding.
pub fn skip_repeats(seed: CounterState) -> impl FnOnce(States) -> States + Send + 'static {
    move |states: States| -> States {
        Box::pin(async_stream::stream! {
            let mut previous = seed;
            for await state in states {
                if state != previous {
                    previous = state.clone();
                    yield state;
                }
            }
        })
    }
}

/// Host for a counter store.
///
/// Owns the cancellation scope the store is attached to, so clearing the
/// view-model tears the store down.
#[derive(Debug)]
pub struct CounterViewModel {
    scope: CancellationScope,
    store: Store<CounterReducer>,
}

impl CounterViewModel {
    /// Label used for the view-model's store
    pub const LABEL: &'static str = "counter";

    /// Create the view-model and attach its store
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoRuntime`] if called outside a Tokio runtime.
    pub fn new(reducer: CounterReducer) -> Result<Self, StoreError> {
        let initial = reducer.initial_state();
        let store = Store::with_config(reducer, StoreConfig::new(Self::LABEL))
            .with_binding(skip_repeats(initial));
        let scope = CancellationScope::new();
        store.attach(&scope)?;

        Ok(Self { scope, store })
    }

    /// Forward an action to the store
    pub fn dispatch(&self, action: CounterAction) {
        self.store.dispatch(action);
    }

    /// Observe state changes
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&CounterState) + Send + Sync + 'static,
    {
        self.store.subscribe(observer)
    }

    /// The current state
    #[must_use]
    pub fn state(&self) -> CounterState {
        self.store.current()
    }

    /// States as an async stream
    #[must_use]
    pub fn states(&self) -> StateStream<CounterState> {
        self.store.states()
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &Store<CounterReducer> {
        &self.store
    }

    /// The host is going away: stop the store and detach observers
    pub fn on_cleared(&self) {
        self.scope.cancel();
    }
}

impl Drop for CounterViewModel {
    fn drop(&mut self) {
        self.on_cleared();
    }
}
