//! Periodic force-fail of stalled jobs

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::coordinator::PipelineCoordinator;

/// Run `fail_stalled` every `watchdog_interval` until `shutdown` flips
pub fn spawn_watchdog(
    coordinator: Arc<PipelineCoordinator>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = coordinator.config().processing.watchdog_interval();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!("Watchdog started, scanning every {}s", period.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let failed = coordinator.fail_stalled(Utc::now());
                    if !failed.is_empty() {
                        tracing::warn!("Watchdog force-failed {} stalled jobs", failed.len());
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Watchdog stopped");
    })
}
