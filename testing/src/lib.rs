//! # Unistate Testing
//!
//! Testing utilities and helpers for the Unistate engine.
//!
//! This crate provides:
//! - [`StateRecorder`]: an observer that records every state it sees
//! - [`RecordingPublisher`] and [`RecordingChannel`]: substitutable parts
//!   for `Store::with_parts` that remember what went through them
//! - [`ReducerTest`]: Given-When-Then tests for reducers, driven through a
//!   real pipeline without a store
//!
//! ## Example
//!
//! ```ignore
//! use unistate_runtime::{CancellationScope, Store};
//! use unistate_testing::StateRecorder;
//!
//! #[tokio::test]
//! async fn test_counter_flow() {
//!     let scope = CancellationScope::new();
//!     let store = Store::new(CounterReducer::default());
//!     let recorder = StateRecorder::new();
//!     let _subscription = store.subscribe_observer(recorder.observer());
//!
//!     store.attach(&scope).unwrap();
//!     store.dispatch(CounterAction::Increment);
//!
//!     let states = recorder.wait_for_len(2, Duration::from_secs(1)).await.unwrap();
//!     assert_eq!(states.last().map(|s| s.count), Some(1));
//! }
//! ```

/// State recording observer
pub mod recorder;

/// Recording action channel and state publisher
pub mod doubles;


/// Test helpers and utilities
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Honours `RUST_LOG`. Safe to call from every test; only the first call
    /// installs anything.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use doubles::{RecordingChannel, RecordingPublisher};
pub use helpers::init_test_tracing;
pub use recorder::StateRecorder;
pub use reducer_test::ReducerTest;
