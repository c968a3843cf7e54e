//! The serialized pipeline.
//!
//! Consumes actions one at a time. For each action it calls `perform`,
//! drains the whole output stream through `reduce`, and publishes every
//! intermediate state before it touches the next action.
//!
//! # Ordering
//!
//! ```text
//! actions:   A1 ─────────────── A2 ────────── A3
//!             │                  │             │
//! perform:   [o1, o2]           [ ]           [o3]
//!             │   │                            │
//! reduce:    s1  s2                           s3
//!             │   │                            │
//! publish:   s1  s2                           s3
//! ```
//!
//! `perform(A2)` does not start until `o2` has been reduced, however slow
//! `perform(A1)` is. A failed `perform` contributes nothing and the pipeline
//! moves on; a failed `reduce` ends the run.
//!
//! # Cancellation
//!
//! Scopes registered with [`Pipeline::with_cancellation`] are checked before
//! every `perform`, every `reduce` and every publish. Once one is cancelled
//! the run ends without touching queued actions, even if the cancel came
//! from an observer in the middle of a publish.

use crate::error::StoreError;
use crate::lifecycle::CancellationScope;
use crate::metrics::{
    OUTPUTS_TOTAL, PERFORM_FAILURES, REDUCE_DURATION, REDUCE_FAILURES, STATES_PUBLISHED,
    TURN_DURATION, TURNS_TOTAL,
};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use unistate_core::{ActionStream, Reducer, StateBinding, StatePublisher};

/// Folds an action stream into published states.
///
/// A pipeline is single-use: [`run`](Self::run) consumes it.
pub struct Pipeline<R>
where
    R: Reducer,
{
    reducer: Arc<R>,
    publisher: Arc<dyn StatePublisher<R::State>>,
    binding: Option<StateBinding<R::State>>,
    label: Arc<str>,
    cancellation: Vec<CancellationScope>,
}

impl<R> Pipeline<R>
where
    R: Reducer + 'static,
{
    /// Create a pipeline that reduces with `reducer` and publishes to `publisher`
    #[must_use]
    pub fn new(reducer: Arc<R>, publisher: Arc<dyn StatePublisher<R::State>>) -> Self {
        Self {
            reducer,
            publisher,
            binding: None,
            label: Arc::from(crate::StoreConfig::DEFAULT_LABEL),
            cancellation: Vec::new(),
        }
    }

    /// Transform the reduced states before they are published
    #[must_use]
    pub fn with_binding(mut self, binding: StateBinding<R::State>) -> Self {
        self.binding = Some(binding);
        self
    }

    /// End the run once `scope` is cancelled. May be called repeatedly.
    #[must_use]
    pub fn with_cancellation(mut self, scope: CancellationScope) -> Self {
        self.cancellation.push(scope);
        self
    }

    /// Label used for metrics
    #[must_use]
    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = label.into();
        self
    }

    /// Run until the action stream ends, `reduce` fails, or a cancellation
    /// scope is cancelled.
    ///
    /// The running state is seeded from the publisher's current state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReduceFailed`] if `reduce` fails. Nothing is
    /// published after the failure.
    pub async fn run(self, actions: ActionStream<R::Action>) -> Result<(), StoreError> {
        let Self {
            reducer,
            publisher,
            binding,
            label,
            cancellation,
        } = self;

        let halt: Arc<[CancellationScope]> = cancellation.into();
        let failure = Arc::new(OnceLock::new());
        let reduced = fold(
            reducer,
            actions,
            publisher.current(),
            Arc::clone(&failure),
            Arc::clone(&halt),
            Arc::clone(&label),
        );
        let mut states = match binding {
            Some(bind) => bind(reduced),
            None => reduced,
        };

        while let Some(state) = states.next().await {
            if halted(&halt) {
                tracing::debug!("Pipeline cancelled, dropping unpublished state");
                break;
            }
            publisher.publish(state);
            metrics::counter!(STATES_PUBLISHED, "store" => label.to_string()).increment(1);
        }

        match failure.get() {
            Some(error) => Err(error.clone()),
            None => {
                tracing::debug!("Action stream ended");
                Ok(())
            },
        }
    }
}

/// The reduced-state stream: one item per successfully reduced output.
///
/// On a `reduce` failure the error is stored in `failure` and the stream
/// ends. The stream also ends as soon as any scope in `halt` is cancelled.
fn fold<R>(
    reducer: Arc<R>,
    mut actions: ActionStream<R::Action>,
    seed: R::State,
    failure: Arc<OnceLock<StoreError>>,
    halt: Arc<[CancellationScope]>,
    label: Arc<str>,
) -> BoxStream<'static, R::State>
where
    R: Reducer + 'static,
{
    Box::pin(async_stream::stream! {
        let mut current = seed;

        while let Some(action) = actions.next().await {
            if halted(&halt) {
                tracing::debug!("Pipeline cancelled, dropping queued actions");
                return;
            }
            let turn_started = Instant::now();
            metrics::counter!(TURNS_TOTAL, "store" => label.to_string()).increment(1);
            tracing::debug!(action = ?action, "Performing action");

            let mut outputs = reducer.perform(action.clone());
            while let Some(item) = outputs.next().await {
                let (output_action, data) = match item {
                    Ok(output) => output.into_parts(),
                    Err(error) => {
                        metrics::counter!(PERFORM_FAILURES, "store" => label.to_string())
                            .increment(1);
                        tracing::warn!(
                            action = ?action,
                            error = %error,
                            "Perform failed, dropping remaining outputs"
                        );
                        break;
                    },
                };
                metrics::counter!(OUTPUTS_TOTAL, "store" => label.to_string()).increment(1);
                if halted(&halt) {
                    tracing::debug!(action = ?action, "Pipeline cancelled mid-turn");
                    return;
                }

                let reduce_started = Instant::now();
                let reduced = reducer.reduce(output_action.clone(), current, data).await;
                metrics::histogram!(REDUCE_DURATION, "store" => label.to_string())
                    .record(reduce_started.elapsed().as_secs_f64());

                match reduced {
                    Ok(next) => {
                        tracing::trace!(action = ?output_action, "Output reduced");
                        current = next.clone();
                        yield next;
                    },
                    Err(error) => {
                        metrics::counter!(REDUCE_FAILURES, "store" => label.to_string())
                            .increment(1);
                        tracing::error!(
                            action = ?output_action,
                            error = %error,
                            "Reduce failed, halting pipeline"
                        );
                        let _ = failure.set(StoreError::reduce_failed(&output_action, error));
                        return;
                    },
                }
            }

            metrics::histogram!(TURN_DURATION, "store" => label.to_string())
                .record(turn_started.elapsed().as_secs_f64());
        }
    })
}

fn halted(scopes: &[CancellationScope]) -> bool {
    scopes.iter().any(CancellationScope::is_cancelled)
}
