//! Integration tests for pipeline ordering through an attached Store
//!
//! Every dispatched action is performed in order, every output is reduced
//! in emission order, and every intermediate state reaches observers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use proptest::prelude::*;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use unistate_core::{Output, OutputStream, ReduceFuture, Reducer, effect, reducer};
use unistate_runtime::{CancellationScope, PipelineStatus, Store, StoreError};
use unistate_testing::{RecordingChannel, RecordingPublisher, StateRecorder};

const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum TestError {
    #[error("effect failed")]
    EffectFailed,
    #[error("state rejected")]
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
enum TestAction {
    /// Emits one output with data 1
    Inc,
    /// Emits one output per value
    Emit(Vec<i64>),
    /// Emits one output with no data
    Touch,
    /// `perform` fails before emitting
    Fail,
    /// `reduce` fails
    Poison,
    /// Slow `perform`, logged
    Slow(&'static str),
    /// Fast `perform`, logged
    Fast(&'static str),
}

#[derive(Default)]
struct TestReducer {
    log: Arc<Mutex<Vec<String>>>,
}

impl TestReducer {
    fn note(&self, entry: String) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl Reducer for TestReducer {
    type Action = TestAction;
    type Data = i64;
    type State = i64;
    type Error = TestError;

    fn initial_state(&self) -> i64 {
        0
    }

    fn perform(&self, action: TestAction) -> OutputStream<'_, TestAction, i64, TestError> {
        match action.clone() {
            TestAction::Inc | TestAction::Poison => effect::just(Output::with_data(action, 1)),
            TestAction::Emit(values) => effect::sequence(
                values
                    .into_iter()
                    .map(|v| Output::with_data(action.clone(), v))
                    .collect(),
            ),
            TestAction::Touch => effect::just(Output::empty(action)),
            TestAction::Fail => effect::fail(TestError::EffectFailed),
            TestAction::Slow(tag) => Box::pin(async_stream::try_stream! {
                self.note(format!("perform:{tag}"));
                tokio::time::sleep(Duration::from_millis(40)).await;
                yield Output::with_data(action, 1);
            }),
            TestAction::Fast(tag) => {
                self.note(format!("perform:{tag}"));
                effect::just(Output::with_data(action, 1))
            },
        }
    }

    fn reduce(
        &self,
        action: TestAction,
        state: i64,
        data: Option<i64>,
    ) -> ReduceFuture<'_, i64, TestError> {
        match action {
            TestAction::Poison => reducer::reject(TestError::Rejected),
            TestAction::Touch if data.is_none() => reducer::ready(state + 100),
            TestAction::Slow(tag) | TestAction::Fast(tag) => {
                self.note(format!("reduce:{tag}"));
                reducer::ready(state + 1)
            },
            _ => reducer::ready(state + data.unwrap_or_default()),
        }
    }
}

fn attached(reducer: TestReducer) -> (CancellationScope, Store<TestReducer>, StateRecorder<i64>) {
    unistate_testing::init_test_tracing();
    let scope = CancellationScope::new();
    let store = Store::new(reducer);
    let recorder = StateRecorder::new();
    let _subscription = store.subscribe_observer(recorder.observer());
    store.attach(&scope).unwrap();
    (scope, store, recorder)
}

// ============================================================================
// Tests
// ============================================================================

/// Two identical actions produce two transitions, both observed
#[tokio::test]
async fn test_identical_actions_each_transition() {
    let (_scope, store, recorder) = attached(TestReducer::default());

    store.dispatch(TestAction::Inc);
    store.dispatch(TestAction::Inc);

    let states = recorder.wait_for_len(3, WAIT).await.unwrap();
    assert_eq!(states, vec![0, 1, 2]);
}

/// A failed perform is an empty sequence; the next action still runs
#[tokio::test]
async fn test_failed_perform_then_increment() {
    let (_scope, store, recorder) = attached(TestReducer::default());

    store.dispatch(TestAction::Fail);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(recorder.states(), vec![0]);

    store.dispatch(TestAction::Inc);
    let states = recorder.wait_for_len(2, WAIT).await.unwrap();
    assert_eq!(states, vec![0, 1]);
    assert!(store.is_running());
}

/// The next action's perform waits for the previous action's last reduce
#[tokio::test]
async fn test_slow_perform_holds_back_next_action() {
    let reducer = TestReducer::default();
    let log = Arc::clone(&reducer.log);
    let (_scope, store, recorder) = attached(reducer);

    store.dispatch(TestAction::Slow("a"));
    store.dispatch(TestAction::Fast("b"));
    recorder.wait_for_len(3, WAIT).await.unwrap();

    let log = log.lock().unwrap_or_else(PoisonError::into_inner).clone();
    assert_eq!(log, vec!["perform:a", "reduce:a", "perform:b", "reduce:b"]);
}

/// Outputs of one action are reduced and published in emission order
#[tokio::test]
async fn test_outputs_reduced_in_emission_order() {
    let (_scope, store, recorder) = attached(TestReducer::default());

    store.dispatch(TestAction::Emit(vec![5, -2, 10]));
    store.dispatch(TestAction::Emit(vec![]));
    store.dispatch(TestAction::Inc);

    let states = recorder.wait_for_len(5, WAIT).await.unwrap();
    assert_eq!(states, vec![0, 5, 3, 13, 14]);
}

/// An output without data still transitions
#[tokio::test]
async fn test_output_without_data_reaches_reduce() {
    let (_scope, store, recorder) = attached(TestReducer::default());

    store.dispatch(TestAction::Touch);

    let states = recorder.wait_for_len(2, WAIT).await.unwrap();
    assert_eq!(states, vec![0, 100]);
}

/// Dispatches made before attach collapse to the latest one
#[tokio::test]
async fn test_dispatch_before_attach_keeps_latest() {
    let scope = CancellationScope::new();
    let store = Store::new(TestReducer::default());
    let recorder = StateRecorder::new();
    let _subscription = store.subscribe_observer(recorder.observer());

    store.dispatch(TestAction::Emit(vec![1]));
    store.dispatch(TestAction::Emit(vec![2]));
    assert_eq!(store.latest_action(), Some(TestAction::Emit(vec![2])));
    store.attach(&scope).unwrap();

    let states = recorder.wait_for_len(2, WAIT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(states, vec![0, 2]);
    assert_eq!(recorder.len(), 2);
}

/// A reduce failure halts the store; observers keep the last good state
#[tokio::test]
async fn test_reduce_failure_halts_store() {
    let (_scope, store, recorder) = attached(TestReducer::default());

    store.dispatch(TestAction::Inc);
    store.dispatch(TestAction::Poison);
    store.dispatch(TestAction::Inc);

    let status = tokio::time::timeout(WAIT, store.terminated()).await.unwrap();
    match status {
        PipelineStatus::Failed(StoreError::ReduceFailed { action, .. }) => {
            assert_eq!(action, "Poison");
        },
        other => panic!("unexpected status: {other:?}"),
    }

    assert_eq!(recorder.states(), vec![0, 1]);
    assert_eq!(store.current(), 1);
    assert_eq!(store.observer_count(), 1);

    store.dispatch(TestAction::Inc);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(recorder.states(), vec![0, 1]);
}

/// Substituted parts see exactly what the pipeline does
#[tokio::test]
async fn test_recording_parts_observe_traffic() {
    let channel = Arc::new(RecordingChannel::new());
    let publisher = Arc::new(RecordingPublisher::new(10));
    let scope = CancellationScope::new();
    let store = Store::with_parts(TestReducer::default(), channel.clone(), publisher.clone());
    store.attach(&scope).unwrap();

    store
        .dispatch_and_wait_for(TestAction::Emit(vec![1, 2]), |s| *s == 13, WAIT)
        .await
        .unwrap();

    assert_eq!(channel.dispatched(), vec![TestAction::Emit(vec![1, 2])]);
    assert_eq!(channel.consumer_count(), 1);
    // Seeded from the publisher, not from initial_state
    assert_eq!(publisher.published(), vec![11, 13]);

    store.detach();
    store.dispatch(TestAction::Inc);
    assert_eq!(channel.ignored_count(), 1);
    assert_eq!(publisher.clear_count(), 1);
}

proptest! {
    /// Property: published states are the left fold of all outputs, in order
    #[test]
    fn published_states_are_prefix_folds(
        batches in prop::collection::vec(prop::collection::vec(-1_000_i64..1_000, 0..4), 1..16)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        let expected: Vec<i64> = std::iter::once(0)
            .chain(batches.iter().flatten().scan(0, |acc, v| {
                *acc += v;
                Some(*acc)
            }))
            .collect();

        let observed = runtime.block_on(async {
            let (_scope, store, recorder) = attached(TestReducer::default());
            for batch in &batches {
                store.dispatch(TestAction::Emit(batch.clone()));
            }
            recorder.wait_for_len(expected.len(), WAIT).await.expect("all states published")
        });

        prop_assert_eq!(observed, expected);
    }
}
