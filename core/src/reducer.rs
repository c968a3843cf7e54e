//! The reducer contract: initial state, effects, and state folding.
//!
//! A [`Reducer`] is the one piece of user code the engine runs. The engine
//! calls [`Reducer::perform`] once per dispatched action and folds every
//! [`Output`] it yields through [`Reducer::reduce`], one at a time, in
//! emission order.

use crate::output::Output;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::fmt::Debug;

/// Stream of outputs returned by [`Reducer::perform`].
///
/// An `Err` item ends the output sequence for that action. The error is
/// logged by the engine and never halts it.
pub type OutputStream<'a, A, D, E> = BoxStream<'a, Result<Output<A, D>, E>>;

/// Future returned by [`Reducer::reduce`].
///
/// An `Err` is fatal to the pipeline that called it.
pub type ReduceFuture<'a, S, E> = BoxFuture<'a, Result<S, E>>;

/// The reducer contract.
///
/// # Type Parameters
///
/// - `Action`: Caller-defined intent values
/// - `Data`: Payload carried by outputs
/// - `State`: Immutable state snapshot
/// - `Error`: Failure type for both `perform` and `reduce`
///
/// # Dyn Compatibility
///
/// Methods return boxed futures and streams instead of using `async fn` so
/// the trait can be used as `Arc<dyn Reducer<...>>` and the returned work is
/// always `Send`.
///
/// # Concurrency
///
/// The engine never runs two `reduce` calls at once, and it never starts
/// `perform` for a new action before the previous action's output stream is
/// drained. Implementations that keep internal state must still be `Sync`,
/// since the engine shares the reducer with the task that runs it.
///
/// # Example
///
/// ```
/// use unistate_core::{effect, reducer, Output, OutputStream, ReduceFuture, Reducer};
///
/// #[derive(Clone, Debug)]
/// enum Action {
///     Add(i64),
///     Reset,
/// }
///
/// struct Adder;
///
/// impl Reducer for Adder {
///     type Action = Action;
///     type Data = i64;
///     type State = i64;
///     type Error = std::convert::Infallible;
///
///     fn initial_state(&self) -> i64 {
///         0
///     }
///
///     fn perform(&self, action: Action) -> OutputStream<'_, Action, i64, Self::Error> {
///         match action {
///             Action::Add(n) => effect::just(Output::with_data(action, n)),
///             Action::Reset => effect::just(Output::empty(action)),
///         }
///     }
///
///     fn reduce(
///         &self,
///         action: Action,
///         state: i64,
///         data: Option<i64>,
///     ) -> ReduceFuture<'_, i64, Self::Error> {
///         match action {
///             Action::Add(_) => reducer::ready(state + data.unwrap_or_default()),
///             Action::Reset => reducer::ready(0),
///         }
///     }
/// }
/// ```
pub trait Reducer: Send + Sync {
    /// The action type this reducer processes
    type Action: Clone + Debug + Send + 'static;

    /// The payload type carried by outputs
    type Data: Send + 'static;

    /// The state type this reducer folds into
    type State: Clone + Send + Sync + 'static;

    /// The failure type of `perform` and `reduce`
    type Error: std::error::Error + Send + Sync + 'static;

    /// The state before any action is processed
    fn initial_state(&self) -> Self::State;

    /// Run the effects for an action.
    ///
    /// May suspend, and may yield zero, one or many outputs over time. The
    /// engine drains this stream completely before performing the next
    /// action.
    fn perform(
        &self,
        action: Self::Action,
    ) -> OutputStream<'_, Self::Action, Self::Data, Self::Error>;

    /// Fold one output into the state.
    ///
    /// Must be deterministic given its inputs and must terminate; the engine
    /// applies no timeout.
    ///
    /// # Errors
    ///
    /// Any error halts the pipeline: no further actions are processed and no
    /// further state is published.
    fn reduce(
        &self,
        action: Self::Action,
        state: Self::State,
        data: Option<Self::Data>,
    ) -> ReduceFuture<'_, Self::State, Self::Error>;
}

/// A `reduce` result that is available immediately.
#[must_use]
pub fn ready<'a, S, E>(state: S) -> ReduceFuture<'a, S, E>
where
    S: Send + 'a,
    E: Send + 'a,
{
    Box::pin(futures::future::ready(Ok(state)))
}

/// A `reduce` failure that is available immediately.
#[must_use]
pub fn reject<'a, S, E>(error: E) -> ReduceFuture<'a, S, E>
where
    S: Send + 'a,
    E: Send + 'a,
{
    Box::pin(futures::future::ready(Err(error)))
}
