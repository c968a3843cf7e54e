use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use unistate_core::ChannelError;

/// Errors that can occur during Store operations
///
/// `Clone` so a terminal failure can be carried in
/// [`PipelineStatus`](crate::lifecycle::PipelineStatus) and handed to every
/// caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// `attach` was called on a store that is already running
    #[error("Store is already attached")]
    AlreadyAttached,

    /// The store was torn down and cannot be attached again
    #[error("Store has been detached")]
    Detached,

    /// The action channel refused a consumer
    #[error("Action channel error: {0}")]
    Channel(#[from] ChannelError),

    /// `reduce` returned an error; the pipeline halted
    ///
    /// No further actions are processed and no further state is published.
    #[error("Reduce failed for action {action}: {source}")]
    ReduceFailed {
        /// Debug rendering of the action being reduced
        action: String,
        /// The reducer's error
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    /// The pipeline task panicked (in `perform`, `reduce` or an observer)
    #[error("Pipeline panicked: {0}")]
    Panicked(String),

    /// `attach` was called outside a Tokio runtime
    #[error("Store must be attached from within a Tokio runtime")]
    NoRuntime,

    /// Timeout waiting for a matching state
    ///
    /// Returned by `dispatch_and_wait_for` when the timeout expires before
    /// a matching state is published.
    #[error("Timeout waiting for state")]
    Timeout,

    /// The state stream ended before a matching state was published
    ///
    /// Observers are cleared when the store is detached.
    #[error("State stream closed")]
    StatesClosed,
}

impl StoreError {
    /// Wrap a reducer error raised while reducing `action`
    pub(crate) fn reduce_failed<A, E>(action: &A, error: E) -> Self
    where
        A: std::fmt::Debug,
        E: StdError + Send + Sync + 'static,
    {
        Self::ReduceFailed {
            action: format!("{action:?}"),
            source: Arc::new(error),
        }
    }

    /// Whether this error stopped the pipeline
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ReduceFailed { .. } | Self::Panicked(_))
    }
}
