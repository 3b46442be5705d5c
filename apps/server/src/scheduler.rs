//! Background scheduler for periodic collection cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::main_lib::AppState;

/// Delay before the first cycle so the server finishes starting up.
const INITIAL_DELAY_SECS: u64 = 30;

/// Starts the background collection scheduler.
pub fn start_collection_scheduler(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        info!(
            "Collection scheduler started ({}h interval)",
            every.as_secs() / 3600
        );
        tokio::time::sleep(Duration::from_secs(INITIAL_DELAY_SECS)).await;

        // First tick fires immediately.
        let mut ticks = interval(every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;
            run_scheduled_cycle(&state).await;
        }
    });
}

async fn run_scheduled_cycle(state: &Arc<AppState>) {
    if state.orchestrator.is_running() {
        info!("Scheduled cycle skipped: a cycle is already running");
        return;
    }

    match state.orchestrator.run_cycle().await {
        Ok(report) => info!(
            "Scheduled cycle {} finished: {} succeeded, {} failed, {} skipped, {} exhausted",
            report.cycle_id,
            report.succeeded,
            report.failed,
            report.skipped,
            report.exhausted.len()
        ),
        Err(e) => error!("Scheduled cycle failed: {}", e),
    }
}
