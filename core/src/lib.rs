//! # Unistate Core
//!
//! Core traits and types for the Unistate unidirectional state engine.
//!
//! This crate defines the contracts the runtime is built around. It contains
//! no executor, no task spawning and no default implementations beyond small
//! helpers for building output streams.
//!
//! ## Core Concepts
//!
//! - **Action**: A caller-issued intent (`Increment`, `Load(id)`)
//! - **Output**: An `(action, optional data)` pair produced by an effect
//! - **State**: An immutable snapshot, changed only by `reduce`
//! - **Reducer**: Initial state, async `perform`, and `reduce`
//! - **Action Channel**: Single-consumer entry point for dispatched actions
//! - **State Publisher**: Replay-latest holder of the current state
//!
//! ## Data Flow
//!
//! ```text
//! dispatch(action)
//!        │
//!        ▼
//! ┌────────────────┐
//! │ Action Channel │
//! └───────┬────────┘
//!         │ one action at a time
//!         ▼
//! ┌────────────────┐     perform(action) ──► Output, Output, ...
//! │    Pipeline    │
//! │                │     reduce(output.action, state, output.data)
//! └───────┬────────┘
//!         │ every intermediate state
//!         ▼
//! ┌────────────────┐
//! │ StatePublisher │ ──► observers (replay-latest)
//! └────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use unistate_core::{effect, reducer, Output, OutputStream, ReduceFuture, Reducer};
//!
//! #[derive(Clone, Debug)]
//! enum Action {
//!     Increment,
//! }
//!
//! struct Counter;
//!
//! impl Reducer for Counter {
//!     type Action = Action;
//!     type Data = i64;
//!     type State = i64;
//!     type Error = std::convert::Infallible;
//!
//!     fn initial_state(&self) -> i64 {
//!         0
//!     }
//!
//!     fn perform(&self, action: Action) -> OutputStream<'_, Action, i64, Self::Error> {
//!         effect::just(Output::with_data(action, 1))
//!     }
//!
//!     fn reduce(
//!         &self,
//!         _action: Action,
//!         state: i64,
//!         data: Option<i64>,
//!     ) -> ReduceFuture<'_, i64, Self::Error> {
//!         reducer::ready(state + data.unwrap_or_default())
//!     }
//! }
//! ```

/// Output pairs produced by the `perform` step
pub mod output;

/// The reducer contract
pub mod reducer;

/// Helpers for building output streams
pub mod effect;

/// Action channel contract
pub mod channel;

/// State publisher contract and subscriptions
pub mod publisher;

/// Host-side transformation of the reduced state stream
pub mod binding;

pub use binding::StateBinding;
pub use channel::{ActionChannel, ActionStream, ChannelError};
pub use output::Output;
pub use publisher::{Observer, StatePublisher, Subscription, SubscriptionId};
pub use reducer::{OutputStream, ReduceFuture, Reducer};

// Re-export the stream types implementors need to name
pub use futures::future::BoxFuture;
pub use futures::stream::BoxStream;
