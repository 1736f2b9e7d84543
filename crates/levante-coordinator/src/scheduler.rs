//! Periodic refresh loop

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::coordinator::UpdateCoordinator;

/// Refresh `coordinator` every `period` until `cancel` fires
///
/// The first refresh happens one period after spawning.
pub fn spawn_refresh_loop(
    coordinator: UpdateCoordinator,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(refresh_loop(coordinator, period, cancel))
}

async fn refresh_loop(
    coordinator: UpdateCoordinator,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    debug!(address = %coordinator.address(), period = ?period, "Refresh loop started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = coordinator.refresh_now().await {
                    warn!(address = %coordinator.address(), error = %e, "Periodic refresh failed");
                }
            }
        }
    }
    debug!(address = %coordinator.address(), "Refresh loop stopped");
}
