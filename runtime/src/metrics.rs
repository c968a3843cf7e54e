//! Prometheus metrics for observability and monitoring.
//!
//! Every metric is labelled with `store` (the [`StoreConfig`](crate::StoreConfig)
//! label), so several stores in one process can be told apart.
//!
//! # Example
//!
//! ```rust,no_run
//! use unistate_runtime::metrics;
//!
//! # fn example() -> Result<(), metrics::MetricsError> {
//! let handle = metrics::install_prometheus()?;
//! // ... run stores ...
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Actions accepted by `dispatch`
pub const ACTIONS_DISPATCHED: &str = "unistate.actions.dispatched";
/// Actions ignored because the store was torn down
pub const ACTIONS_IGNORED: &str = "unistate.actions.ignored";
/// Pipeline turns started
pub const TURNS_TOTAL: &str = "unistate.turns.total";
/// Outputs drawn from `perform` streams
pub const OUTPUTS_TOTAL: &str = "unistate.outputs.total";
/// `perform` streams that ended with an error
pub const PERFORM_FAILURES: &str = "unistate.perform.failures";
/// `reduce` calls that failed (each one halts its pipeline)
pub const REDUCE_FAILURES: &str = "unistate.reduce.failures";
/// States handed to the publisher
pub const STATES_PUBLISHED: &str = "unistate.states.published";
/// Time spent inside `reduce`
pub const REDUCE_DURATION: &str = "unistate.reduce.duration_seconds";
/// Time from `perform` start to the end of its output stream
pub const TURN_DURATION: &str = "unistate.turn.duration_seconds";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register descriptions for every engine metric.
///
/// Safe to call more than once.
pub fn describe_metrics() {
    describe_counter!(ACTIONS_DISPATCHED, "Total number of actions dispatched to a store");
    describe_counter!(
        ACTIONS_IGNORED,
        "Total number of actions dispatched after the store was torn down"
    );
    describe_counter!(TURNS_TOTAL, "Total number of pipeline turns started");
    describe_counter!(OUTPUTS_TOTAL, "Total number of outputs folded through reduce");
    describe_counter!(PERFORM_FAILURES, "Total number of perform calls that failed");
    describe_counter!(REDUCE_FAILURES, "Total number of reduce calls that failed");
    describe_counter!(STATES_PUBLISHED, "Total number of states published to observers");
    describe_histogram!(REDUCE_DURATION, Unit::Seconds, "Time taken by a single reduce call");
    describe_histogram!(TURN_DURATION, Unit::Seconds, "Time taken by a full pipeline turn");
}

/// Install a Prometheus recorder and describe the engine metrics.
///
/// Returns the handle used to render the exposition text.
///
/// # Errors
///
/// Returns [`MetricsError::Build`] if the histogram buckets are rejected and
/// [`MetricsError::Install`] if another recorder is already installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[
                0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0,
            ],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_metrics();
    tracing::info!("Prometheus metrics recorder installed");

    Ok(handle)
}
