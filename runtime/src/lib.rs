//! # Unistate Runtime
//!
//! Runtime implementation for the Unistate unidirectional state engine.
//!
//! This crate provides the default action channel and state publisher, the
//! serialized pipeline that folds actions into states, and the [`Store`]
//! that binds them to a host's lifetime.
//!
//! ## Core Components
//!
//! - **Store**: Owns a reducer and runs its pipeline while attached
//! - **Pipeline**: One action at a time, every output reduced and published
//! - **`LatestActionChannel`**: Single-consumer channel that keeps only the
//!   latest action until the pipeline attaches
//! - **`ReplayPublisher`**: Last-value slot with ordered observers
//! - **Lifecycle**: Host-scoped task with a terminal status
//!
//! ## Example
//!
//! ```ignore
//! use unistate_runtime::{CancellationScope, Store};
//!
//! let scope = CancellationScope::new();
//! let store = Store::new(MyReducer);
//! store.attach(&scope)?;
//!
//! let subscription = store.subscribe(|state| println!("{state:?}"));
//! store.dispatch(Action::Load);
//!
//! // Host goes away: pipeline stops, observers are detached
//! scope.cancel();
//! ```

/// Error types for the Store runtime
pub mod error;

/// Store configuration
pub mod config;

/// Health check types
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// Default action channel
pub mod channel;

/// Default state publisher and state stream
pub mod publisher;

/// The serialized action-to-state pipeline
pub mod pipeline;

/// Cancellation scopes and pipeline status
pub mod lifecycle;

/// Store runtime
pub mod store;

pub use channel::LatestActionChannel;
pub use config::StoreConfig;
pub use error::StoreError;
pub use health::{HealthCheck, HealthStatus};
pub use lifecycle::{CancellationScope, Lifecycle, PipelineStatus};
pub use pipeline::Pipeline;
pub use publisher::{ReplayPublisher, StateStream};
pub use store::{Dispatcher, Store};
