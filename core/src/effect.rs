//! Constructors for [`OutputStream`]s.
//!
//! Most `perform` implementations either yield a fixed set of outputs or
//! run one async computation. These helpers cover both without spelling out
//! `Box::pin(futures::stream::...)` each time. For multi-step effects use
//! `async_stream::try_stream!` and box the result.

use crate::output::Output;
use crate::reducer::OutputStream;
use futures::stream;
use std::future::Future;

/// An effect that yields nothing.
///
/// The action produces no state transition.
#[must_use]
pub fn none<'a, A, D, E>() -> OutputStream<'a, A, D, E>
where
    A: Send + 'a,
    D: Send + 'a,
    E: Send + 'a,
{
    Box::pin(stream::empty())
}

/// An effect that yields a single output immediately.
#[must_use]
pub fn just<'a, A, D, E>(output: Output<A, D>) -> OutputStream<'a, A, D, E>
where
    A: Send + 'a,
    D: Send + 'a,
    E: Send + 'a,
{
    Box::pin(stream::once(futures::future::ready(Ok(output))))
}

/// An effect that yields the given outputs in order.
#[must_use]
pub fn sequence<'a, A, D, E>(outputs: Vec<Output<A, D>>) -> OutputStream<'a, A, D, E>
where
    A: Send + 'a,
    D: Send + 'a,
    E: Send + 'a,
{
    Box::pin(stream::iter(outputs.into_iter().map(Ok)))
}

/// An effect that runs one async computation and yields its result.
///
/// # Example
///
/// ```
/// use unistate_core::{effect, Output, OutputStream};
///
/// fn load(id: u32) -> OutputStream<'static, u32, String, std::io::Error> {
///     effect::from_future(async move {
///         // fetch...
///         Ok(Output::with_data(id, format!("item-{id}")))
///     })
/// }
/// ```
#[must_use]
pub fn from_future<'a, A, D, E, F>(future: F) -> OutputStream<'a, A, D, E>
where
    F: Future<Output = Result<Output<A, D>, E>> + Send + 'a,
    A: Send + 'a,
    D: Send + 'a,
    E: Send + 'a,
{
    Box::pin(stream::once(future))
}

/// An effect that fails before yielding anything.
///
/// The engine treats this as an empty output sequence.
#[must_use]
pub fn fail<'a, A, D, E>(error: E) -> OutputStream<'a, A, D, E>
where
    A: Send + 'a,
    D: Send + 'a,
    E: Send + 'a,
{
    Box::pin(stream::once(futures::future::ready(Err(error))))
}
