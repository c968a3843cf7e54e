//! Counter example binary
//!
//! Demonstrates the Unistate engine with a counter hosted by a view-model.

use counter::{CounterAction, CounterReducer, CounterViewModel};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unistate_runtime::metrics;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,unistate_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let prometheus = metrics::install_prometheus()?;

    println!("=== Counter Example: Unistate ===\n");

    let view_model = CounterViewModel::new(CounterReducer::new())?;
    let _subscription = view_model.subscribe(|state| println!("  observed: {state}"));
    let store = view_model.store();

    println!("\n>>> Dispatching: Increment");
    store
        .dispatch_and_wait_for(CounterAction::Increment, |s| s.count == 1, WAIT)
        .await?;

    println!("\n>>> Dispatching: Add(5)");
    store
        .dispatch_and_wait_for(CounterAction::Add(5), |s| s.count == 6, WAIT)
        .await?;

    println!("\n>>> Dispatching: Decrement");
    store
        .dispatch_and_wait_for(CounterAction::Decrement, |s| s.count == 5, WAIT)
        .await?;

    println!("\n>>> Dispatching: Load (emits Loading, then the loaded amount)");
    store
        .dispatch_and_wait_for(CounterAction::Load, |s| !s.loading && s.count == 15, WAIT)
        .await?;

    println!("\n>>> Dispatching: LoadBroken (perform fails, nothing changes)");
    view_model.dispatch(CounterAction::LoadBroken);
    store
        .dispatch_and_wait_for(CounterAction::Increment, |s| s.count == 16, WAIT)
        .await?;

    println!("\n>>> Dispatching: Reset");
    store
        .dispatch_and_wait_for(CounterAction::Reset, |s| s.count == 0, WAIT)
        .await?;

    println!("\n>>> Dispatching: Add(i64::MAX), then Increment (reduce overflows)");
    view_model.dispatch(CounterAction::Add(i64::MAX));
    view_model.dispatch(CounterAction::Increment);
    let status = tokio::time::timeout(WAIT, store.terminated()).await?;
    println!("Store status: {status}");
    if let Some(error) = status.error() {
        println!("Halted by: {error}");
    }
    println!("Last good state: {}", view_model.state());

    let health = store.health();
    println!("Health: {health}");

    view_model.on_cleared();

    println!("\n=== Metrics ===\n");
    println!("{}", prometheus.render());

    Ok(())
}
