//! The PENDING auto-expiration sweep.

use std::sync::Arc;
use std::time::Duration;

use cb_common::time::TimestampMs;
use cb_tokio::{notify_once::NotifyOnce, task::CbTask};
use tracing::info;

use crate::booking::BookingService;

/// Spawns the periodic task that expires stale PENDING bookings. The task
/// runs until `shutdown` fires.
pub fn spawn_expiration_sweeper(
    booking_service: Arc<BookingService>,
    interval: Duration,
    mut shutdown: NotifyOnce,
) -> CbTask<()> {
    CbTask::spawn("booking expiration sweeper", async move {
        let mut ticks = tokio::time::interval(interval);
        // A missed tick (e.g. a long sweep) should not cause a burst.
        ticks
            .set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Mitigate possible select! race after a shutdown signal
                biased;
                () = shutdown.recv() => break,
                _ = ticks.tick() => {
                    booking_service.expire_pending(TimestampMs::now()).await;
                }
            }
        }

        info!("Expiration sweeper shut down");
    })
}
