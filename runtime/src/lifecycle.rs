//! Host-scoped execution of a pipeline.
//!
//! A [`CancellationScope`] stands for the host's lifetime. A [`Lifecycle`]
//! runs one pipeline task inside such a scope and records how it ended.
//!
//! ```text
//!            start              stop / scope cancelled / stream ended
//!   Idle ──────────► Running ──────────────────────────────────► Stopped
//!                       │
//!                       │ reduce failed / panic
//!                       └──────────────────────────────────────► Failed
//! ```
//!
//! `Stopped` and `Failed` are terminal.

use crate::error::StoreError;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The host's lifetime, as seen by the stores attached to it.
///
/// Clones share the same state: cancelling any clone cancels them all.
/// Cancellation is permanent.
///
/// # Example
///
/// ```
/// use unistate_runtime::CancellationScope;
///
/// # tokio_test::block_on(async {
/// let scope = CancellationScope::new();
/// let watcher = scope.clone();
///
/// scope.cancel();
/// watcher.cancelled().await;
/// assert!(watcher.is_cancelled());
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct CancellationScope {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationScope {
    /// Create a live scope
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// End the scope. Idempotent.
    pub fn cancel(&self) {
        if !self.state.send_replace(true) {
            tracing::debug!("Cancellation scope ended");
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolve once the scope is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so this only resolves on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a pipeline is in its life.
#[derive(Debug, Clone)]
pub enum PipelineStatus {
    /// Not attached yet
    Idle,
    /// Processing actions
    Running,
    /// Detached, cancelled, or the action stream ended
    Stopped,
    /// Halted by an error
    Failed(StoreError),
}

impl PipelineStatus {
    /// Whether the pipeline is processing actions
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the pipeline has ended for good
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }

    /// The error that halted the pipeline, if it failed
    #[must_use]
    pub const fn error(&self) -> Option<&StoreError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Short lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs one pipeline task and tracks its [`PipelineStatus`].
pub struct Lifecycle {
    status: Arc<watch::Sender<PipelineStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
    stop_signal: CancellationScope,
}

impl Lifecycle {
    /// Create an idle lifecycle
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = watch::channel(PipelineStatus::Idle);
        Self {
            status: Arc::new(status),
            task: Mutex::new(None),
            stop_signal: CancellationScope::new(),
        }
    }

    /// Scope cancelled by [`stop`](Self::stop).
    ///
    /// Hand it to the pipeline so it can notice a stop issued while it is
    /// busy, e.g. from an observer called during a publish.
    #[must_use]
    pub fn stop_signal(&self) -> CancellationScope {
        self.stop_signal.clone()
    }

    /// The current status
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    /// Resolve with the terminal status once the pipeline has ended
    pub async fn terminated(&self) -> PipelineStatus {
        let mut rx = self.status.subscribe();
        match rx.wait_for(PipelineStatus::is_terminal).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        }
    }

    /// Spawn `pipeline` on `runtime`, bound to `scope`.
    ///
    /// When the pipeline ends, for whatever reason, `teardown` runs on the
    /// pipeline task with the outcome, before the status changes. If
    /// [`stop`](Self::stop) aborts the task first, `teardown` does not run.
    ///
    /// Panics inside `pipeline` are caught and reported as
    /// [`StoreError::Panicked`].
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyAttached`] if a pipeline is running
    /// - [`StoreError::Detached`] if the lifecycle has ended
    pub fn start<F, T>(
        &self,
        runtime: &Handle,
        scope: &CancellationScope,
        pipeline: F,
        teardown: T,
    ) -> Result<(), StoreError>
    where
        F: Future<Output = Result<(), StoreError>> + Send + 'static,
        T: FnOnce(&PipelineStatus) + Send + 'static,
    {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);

        let mut refused = None;
        self.status.send_if_modified(|status| match status {
            PipelineStatus::Idle => {
                *status = PipelineStatus::Running;
                true
            },
            PipelineStatus::Running => {
                refused = Some(StoreError::AlreadyAttached);
                false
            },
            PipelineStatus::Stopped | PipelineStatus::Failed(_) => {
                refused = Some(StoreError::Detached);
                false
            },
        });
        if let Some(error) = refused {
            return Err(error);
        }

        let status = Arc::clone(&self.status);
        let scope = scope.clone();
        let handle = runtime.spawn(async move {
            let outcome = tokio::select! {
                biased;

                () = scope.cancelled() => {
                    tracing::info!("Host scope cancelled, stopping pipeline");
                    PipelineStatus::Stopped
                }
                result = AssertUnwindSafe(pipeline).catch_unwind() => match result {
                    Ok(Ok(())) => PipelineStatus::Stopped,
                    Ok(Err(error)) => PipelineStatus::Failed(error),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::error!(panic = %message, "Pipeline panicked");
                        PipelineStatus::Failed(StoreError::Panicked(message))
                    },
                },
            };

            teardown(&outcome);
            status.send_if_modified(|current| {
                if current.is_running() {
                    *current = outcome;
                    true
                } else {
                    false
                }
            });
        });

        *task = Some(handle);
        Ok(())
    }

    /// Stop the pipeline task.
    ///
    /// Idempotent. A failed lifecycle keeps its `Failed` status. Returns
    /// whether this call moved the status to `Stopped`.
    pub fn stop(&self) -> bool {
        self.stop_signal.cancel();
        let stopped = self.status.send_if_modified(|status| {
            if status.is_terminal() {
                false
            } else {
                *status = PipelineStatus::Stopped;
                true
            }
        });

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }

        stopped
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_teardown() -> (
        Arc<AtomicUsize>,
        impl FnOnce(&PipelineStatus) + Send + 'static,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        (calls, move |_: &PipelineStatus| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn scope_cancel_is_shared_and_permanent() {
        let scope = CancellationScope::new();
        let clone = scope.clone();
        assert!(!clone.is_cancelled());

        scope.cancel();
        scope.cancel();
        clone.cancelled().await;
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn completed_pipeline_stops_and_tears_down() {
        let lifecycle = Lifecycle::new();
        let (calls, teardown) = counting_teardown();

        lifecycle
            .start(&Handle::current(), &CancellationScope::new(), async { Ok(()) }, teardown)
            .unwrap();

        assert!(matches!(lifecycle.terminated().await, PipelineStatus::Stopped));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_pipeline_reports_error() {
        let lifecycle = Lifecycle::new();
        let (_, teardown) = counting_teardown();

        lifecycle
            .start(
                &Handle::current(),
                &CancellationScope::new(),
                async { Err(StoreError::Panicked("boom".into())) },
                teardown,
            )
            .unwrap();

        let status = lifecycle.terminated().await;
        assert!(matches!(status.error(), Some(StoreError::Panicked(m)) if m == "boom"));
        assert_eq!(status.to_string(), "failed");
    }

    #[tokio::test]
    #[allow(clippy::panic)]
    async fn panicking_pipeline_is_caught() {
        let lifecycle = Lifecycle::new();
        let (calls, teardown) = counting_teardown();

        lifecycle
            .start(
                &Handle::current(),
                &CancellationScope::new(),
                async { panic!("observer exploded") },
                teardown,
            )
            .unwrap();

        let status = lifecycle.terminated().await;
        assert!(
            matches!(status.error(), Some(StoreError::Panicked(m)) if m == "observer exploded"),
            "{status:?}"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scope_cancel_stops_a_pending_pipeline() {
        let lifecycle = Lifecycle::new();
        let scope = CancellationScope::new();
        let (calls, teardown) = counting_teardown();

        lifecycle
            .start(&Handle::current(), &scope, futures::future::pending(), teardown)
            .unwrap();
        assert!(lifecycle.status().is_running());

        scope.cancel();
        assert!(matches!(lifecycle.terminated().await, PipelineStatus::Stopped));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_is_refused_unless_idle() {
        let lifecycle = Lifecycle::new();
        let scope = CancellationScope::new();
        let runtime = Handle::current();

        lifecycle
            .start(&runtime, &scope, futures::future::pending(), |_| {})
            .unwrap();
        assert!(matches!(
            lifecycle.start(&runtime, &scope, async { Ok(()) }, |_| {}),
            Err(StoreError::AlreadyAttached)
        ));

        assert!(lifecycle.stop());
        assert!(!lifecycle.stop());
        assert!(matches!(
            lifecycle.start(&runtime, &scope, async { Ok(()) }, |_| {}),
            Err(StoreError::Detached)
        ));
    }

    #[tokio::test]
    async fn stop_keeps_failed_status() {
        let lifecycle = Lifecycle::new();
        lifecycle
            .start(
                &Handle::current(),
                &CancellationScope::new(),
                async { Err(StoreError::Timeout) },
                |_| {},
            )
            .unwrap();
        lifecycle.terminated().await;

        assert!(!lifecycle.stop());
        assert!(matches!(lifecycle.status(), PipelineStatus::Failed(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn stop_cancels_the_stop_signal() {
        let lifecycle = Lifecycle::new();
        let signal = lifecycle.stop_signal();
        lifecycle
            .start(
                &Handle::current(),
                &CancellationScope::new(),
                futures::future::pending(),
                |_| {},
            )
            .unwrap();
        assert!(!signal.is_cancelled());

        lifecycle.stop();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn pre_cancelled_scope_stops_immediately() {
        let lifecycle = Lifecycle::new();
        let scope = CancellationScope::new();
        scope.cancel();

        lifecycle
            .start(&Handle::current(), &scope, futures::future::pending(), |_| {})
            .unwrap();

        let status = tokio::time::timeout(Duration::from_secs(1), lifecycle.terminated())
            .await
            .unwrap();
        assert!(matches!(status, PipelineStatus::Stopped));
    }
}
