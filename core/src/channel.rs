//! The action channel contract.
//!
//! An action channel is the ordered entry point between callers and the
//! pipeline. It has exactly one logical consumer.
//!
//! # Delivery
//!
//! - A live consumer observes every dispatched action, in dispatch order,
//!   duplicates included.
//! - Dispatches made while no consumer is attached are not queued: a newly
//!   attaching consumer is only guaranteed to see the most recent one.
//! - After [`ActionChannel::close`], dispatches are silently ignored and the
//!   consumer stream ends.

use futures::stream::BoxStream;
use thiserror::Error;

/// Stream of actions handed to the single consumer.
pub type ActionStream<A> = BoxStream<'static, A>;

/// Errors returned when attaching a consumer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// A consumer is already attached
    #[error("Action channel already has a consumer")]
    AlreadyConsumed,

    /// The channel was closed and accepts no consumer
    #[error("Action channel is closed")]
    Closed,
}

/// Single-consumer broadcast point for dispatched actions.
///
/// Implemented by the runtime's `LatestActionChannel`. Test doubles
/// implement it to observe or script dispatches without touching the
/// pipeline.
pub trait ActionChannel<A>: Send + Sync {
    /// Make an action available to the consumer.
    ///
    /// Never blocks and never fails. Ignored once the channel is closed.
    fn dispatch(&self, action: A);

    /// Attach the single consumer.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::AlreadyConsumed`] if a consumer is attached
    /// - [`ChannelError::Closed`] if the channel has been closed
    fn consume(&self) -> Result<ActionStream<A>, ChannelError>;

    /// The most recently dispatched action, if any.
    fn latest(&self) -> Option<A>;

    /// Close the channel, ending the consumer stream.
    ///
    /// Idempotent.
    fn close(&self);

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}
