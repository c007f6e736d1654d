//! Fixed-delay reconnection and keep-alive timing.
//!
//! A dropped subscription waits [`ChannelConfig::reconnect_delay`] and
//! then makes exactly one new connection attempt, forever, until its
//! [`CancellationToken`] is cancelled. There is no backoff growth and
//! no attempt cap.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default interval between keep-alive probes on an open connection.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay between a disconnect and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Timing parameters shared by every subscription of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Interval between `ping` probes while the connection is open.
    pub keep_alive_interval: Duration,
    /// Fixed wait before each reconnection attempt.
    pub reconnect_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `true` when the delay elapsed and a reconnection attempt
/// should follow, `false` when the wait was cancelled.
pub async fn wait_before_reconnect(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
