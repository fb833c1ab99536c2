//! Background stale-task recovery.
//!
//! The sweep is the sole fault-recovery mechanism for crashed or hung
//! workers: a lease that is never completed expires by timeout and the
//! task returns to the pending queue. The underlying UPDATE is
//! conditional and idempotent, so every server replica runs its own loop.

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use harvest_core::CacheKeys;

use crate::infra::AppState;

pub fn spawn_sweep(state: AppState) -> JoinHandle<()> {
    let interval = state.config.sweep_interval();
    let timeout = state.config.task_timeout();
    info!(
        "Stale-task sweep running every {:?} with timeout {}s",
        interval,
        timeout.num_seconds()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match state.db.tasks().reset_stale(timeout).await {
                Ok(0) => {}
                Ok(reset) => {
                    state
                        .cache_delete_pattern(CacheKeys::tasks_summary_pattern())
                        .await;
                    info!("Sweep returned {} stale tasks to pending", reset);
                }
                Err(e) => error!("Stale-task sweep failed: {e}"),
            }
        }
    })
}
