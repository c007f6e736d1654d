//! Background update polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::store::{CheckOutcome, NotificationStore};

/// How often the poller checks for updates by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Check for updates every `period` until `cancel` fires.
///
/// The first check runs immediately. Failures are logged and left in
/// the store's `error` field; the next tick is the only retry.
pub async fn run_poller(store: Arc<NotificationStore>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(store = %store.name(), period_secs = period.as_secs(), "Update poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(store = %store.name(), "Update poller cancelled");
                break;
            }
            _ = interval.tick() => {
                match store.check_for_updates().await {
                    Ok(CheckOutcome::Checked { updated }) => {
                        tracing::debug!(store = %store.name(), updated, "Scheduled update check done");
                    }
                    Ok(CheckOutcome::Skipped) => {}
                    Err(e) => {
                        tracing::warn!(store = %store.name(), error = %e, "Scheduled update check failed");
                    }
                }
            }
        }
    }
}
