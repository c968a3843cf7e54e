//! An observer that records states and lets tests wait on them.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::error::Elapsed;
use unistate_core::{Observer, StatePublisher, Subscription};

/// Records every state delivered to its observer, in order.
///
/// Clones share the same record.
///
/// # Example
///
/// ```
/// use unistate_core::StatePublisher;
/// use unistate_runtime::ReplayPublisher;
/// use unistate_testing::StateRecorder;
///
/// let publisher = ReplayPublisher::new(0);
/// let recorder = StateRecorder::new();
/// let _subscription = recorder.attach(&publisher);
///
/// publisher.publish(1);
/// assert_eq!(recorder.states(), vec![0, 1]);
/// ```
#[derive(Debug)]
pub struct StateRecorder<S> {
    states: Arc<watch::Sender<Vec<S>>>,
}

impl<S> StateRecorder<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        let (states, _) = watch::channel(Vec::new());
        Self {
            states: Arc::new(states),
        }
    }

    /// An observer that appends to this recorder
    #[must_use]
    pub fn observer(&self) -> Observer<S> {
        let states = Arc::clone(&self.states);
        Arc::new(move |state: &S| {
            states.send_modify(|states| states.push(state.clone()));
        })
    }

    /// Subscribe this recorder to `publisher`
    pub fn attach(&self, publisher: &(impl StatePublisher<S> + ?Sized)) -> Subscription {
        publisher.subscribe(self.observer())
    }

    /// Every state recorded so far
    #[must_use]
    pub fn states(&self) -> Vec<S> {
        self.states.borrow().clone()
    }

    /// The most recent state
    #[must_use]
    pub fn last(&self) -> Option<S> {
        self.states.borrow().last().cloned()
    }

    /// Number of recorded states
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.borrow().len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.borrow().is_empty()
    }

    /// Wait until at least `count` states are recorded, then return them all.
    ///
    /// # Errors
    ///
    /// Returns [`Elapsed`] if fewer than `count` states arrive within
    /// `timeout`.
    pub async fn wait_for_len(&self, count: usize, timeout: Duration) -> Result<Vec<S>, Elapsed> {
        let mut rx = self.states.subscribe();
        let reached = tokio::time::timeout(timeout, async move {
            rx.wait_for(|states| states.len() >= count)
                .await
                .map(|states| states.clone())
                .ok()
        })
        .await?;

        Ok(reached.unwrap_or_else(|| self.states()))
    }

    /// Wait until a recorded state matches `predicate`, then return it.
    ///
    /// States recorded before the call are checked too.
    ///
    /// # Errors
    ///
    /// Returns [`Elapsed`] if no matching state arrives within `timeout`.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Result<Option<S>, Elapsed>
    where
        F: Fn(&S) -> bool,
    {
        let mut rx = self.states.subscribe();
        tokio::time::timeout(timeout, async move {
            rx.wait_for(|states| states.iter().any(&predicate))
                .await
                .ok()
                .and_then(|states| states.iter().find(|s| predicate(s)).cloned())
        })
        .await
    }

    /// Forget every recorded state
    pub fn reset(&self) {
        self.states.send_modify(Vec::clear);
    }
}

impl<S> Clone for StateRecorder<S> {
    fn clone(&self) -> Self {
        Self {
            states: Arc::clone(&self.states),
        }
    }
}

impl<S> Default for StateRecorder<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use unistate_runtime::ReplayPublisher;

    #[tokio::test]
    async fn wait_for_len_resolves_once_enough_states_arrive() {
        let publisher = ReplayPublisher::new(0);
        let recorder = StateRecorder::new();
        let _subscription = recorder.attach(&publisher);

        let producer = publisher.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.publish(1);
            producer.publish(2);
        });

        let states = recorder
            .wait_for_len(3, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(states, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn wait_for_len_times_out() {
        let recorder = StateRecorder::<i32>::new();
        let result = recorder.wait_for_len(1, Duration::from_millis(10)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wait_for_checks_existing_states() {
        let publisher = ReplayPublisher::new(7);
        let recorder = StateRecorder::new();
        let _subscription = recorder.attach(&publisher);

        let found = recorder
            .wait_for(|s| *s == 7, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(found, Some(7));
    }

    #[test]
    fn clones_share_the_record() {
        let recorder = StateRecorder::new();
        let clone = recorder.clone();
        recorder.observer()(&"a");

        assert_eq!(clone.states(), vec!["a"]);
        assert_eq!(clone.last(), Some("a"));
        clone.reset();
        assert!(recorder.is_empty());
    }
}
