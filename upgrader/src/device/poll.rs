//! Bounded readiness polling

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::errors::UpgradeError;

/// Call `check` every `interval` until it reports ready or `timeout` elapses.
///
/// Errors from `check` count as "not ready yet": a rebooting device refuses
/// connections. The last sleep is clamped to the remaining time and a poll
/// that hangs past the deadline is abandoned.
pub async fn poll_until_ready<P, F>(
    mut check: P,
    timeout: Duration,
    interval: Duration,
) -> Result<(), UpgradeError>
where
    P: FnMut() -> F,
    F: Future<Output = Result<bool, UpgradeError>>,
{
    let deadline = Instant::now() + timeout;
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, check()).await {
            Ok(Ok(true)) => {
                debug!(polls, "Device reported ready");
                return Ok(());
            }
            Ok(Ok(false)) => debug!(polls, "Device not ready yet"),
            Ok(Err(e)) => debug!(polls, "Readiness poll failed: {}", e),
            Err(_) => return Err(UpgradeError::PostRebootTimeoutError(timeout)),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(UpgradeError::PostRebootTimeoutError(timeout));
        }
        tokio::time::sleep(interval.min(remaining)).await;
    }
}
