// ABOUTME: Periodic reconciliation loop driving the group reconciler
// ABOUTME: Runs one pass immediately, then one per interval until shutdown is signalled

use raduno_core::reconciler::Reconciler;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Run reconciliation passes until `shutdown` flips to true or its sender is dropped.
///
/// Passes never overlap: a slow pass delays the next tick instead of queueing
/// a burst. A failed pass is logged and the loop keeps going. Returns the
/// number of passes attempted.
pub async fn run_sync_loop(
    mut reconciler: Reconciler,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    tracing::info!(interval_secs = every.as_secs(), "Starting group sync loop");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut passes = 0usize;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        passes += 1;
        if let Err(e) = reconciler.run_pass().await {
            tracing::error!(pass = passes, error = %format!("{:#}", e), "Reconciliation pass failed");
        }
    }

    tracing::info!(passes, "Group sync loop stopped");
    passes
}
