use std::time::Duration;

use services::Engine;

/// Runs the expiry sweep on a fixed interval until the task is aborted.
/// A failing pass is logged and retried on the next tick.
pub async fn run(engine: Engine, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        tracing::debug!("expiry sweep starting");
        let summary = engine.lifecycle.sweep_now().await;
        if !summary.failures.is_empty() {
            tracing::warn!(
                failed = summary.failures.len(),
                deleted = summary.deleted,
                "expiry sweep finished with failures, retrying next interval"
            );
        }
    }
}
