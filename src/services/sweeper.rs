use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::services::coordinator::{now, Coordinator};

/// The only background task: periodically releases slots held by bookings
/// that never got paid.
pub fn spawn_payment_sweep(coordinator: Arc<Coordinator>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let coordinator = coordinator.clone();
            let result =
                tokio::task::spawn_blocking(move || coordinator.expire_stale_pending(now())).await;

            match result {
                Ok(Ok(0)) => tracing::debug!("payment sweep: nothing to expire"),
                Ok(Ok(expired)) => tracing::info!(expired, "payment sweep released stale bookings"),
                Ok(Err(e)) => tracing::error!(error = %e, "payment sweep failed"),
                Err(e) => tracing::error!(error = %e, "payment sweep task panicked"),
            }
        }
    })
}
