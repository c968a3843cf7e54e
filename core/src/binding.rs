//! Host-side transformation of the reduced state stream.
//!
//! A binding sits between the pipeline and the publisher. It receives the
//! stream of reduced states and returns the stream that is actually
//! published, which lets the host add logging, filtering or derived fields
//! without touching the reducer.
//!
//! The state fed back into `reduce` is always the reduced state; a binding
//! only changes what observers see.

use futures::stream::BoxStream;

/// One-shot transformation applied to the reduced state stream.
///
/// # Example
///
/// ```
/// use futures::StreamExt;
/// use unistate_core::StateBinding;
///
/// // Only publish even counts
/// let binding: StateBinding<i64> =
///     Box::new(|states| states.filter(|s| futures::future::ready(s % 2 == 0)).boxed());
/// ```
pub type StateBinding<S> =
    Box<dyn FnOnce(BoxStream<'static, S>) -> BoxStream<'static, S> + Send>;
