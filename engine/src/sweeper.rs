//! Background task that expires unpaid holds on a fixed interval.

use crate::coordinator::ReservationCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Shortest period the sweep loop accepts
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic driver for [`ReservationCoordinator::expire_reservations`]
pub struct ExpirySweeper;

impl ExpirySweeper {
    /// Spawn the sweep loop.
    ///
    /// The first sweep runs immediately. The task ends when `shutdown`
    /// receives a value or its sender is dropped. A sweep that fails for some
    /// campaigns is not fatal; those campaigns are picked up on the next tick.
    /// Intervals below [`MIN_SWEEP_INTERVAL`] are raised to it.
    #[must_use]
    pub fn spawn(
        coordinator: Arc<ReservationCoordinator>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        if interval < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = interval.as_millis(),
                "Sweep interval below minimum, using {MIN_SWEEP_INTERVAL:?}"
            );
        }
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Expiry sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Expiry sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = coordinator.expire_reservations().await;
                        if report.expired_transactions > 0 || report.failed_campaigns > 0 {
                            info!(
                                campaigns = report.campaigns_checked,
                                expired = report.expired_transactions,
                                released = report.released_numbers,
                                failed = report.failed_campaigns,
                                "Expiry sweep finished"
                            );
                        }
                    }
                }
            }

            info!("Expiry sweeper stopped");
        })
    }
}
