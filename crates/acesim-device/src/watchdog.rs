use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Single-slot liveness signal between a session and its watchdog.
///
/// Any number of pings between two watchdog checks collapse into one; the
/// watchdog consumes the pending ping when it observes it.
#[derive(Debug, Default)]
pub struct PingSignal {
    notify: Notify,
    pings: AtomicU64,
}

impl PingSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the host as alive.
    pub fn ping(&self) {
        self.pings.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Wait for the next ping, consuming it.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Total pings delivered on this signal.
    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::Relaxed)
    }
}

/// How a watchdog run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// No ping arrived within the timeout.
    Expired,
    /// The watchdog was told to stop before it expired.
    Cancelled,
}

/// Liveness timer that must be pinged within `timeout` or it expires.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    timeout: Duration,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run until the signal stays silent for a full timeout or `cancel` fires.
    ///
    /// Expiry is only reported; stopping whatever the watchdog guards is the
    /// caller's job.
    pub async fn supervise(
        &self,
        signal: &PingSignal,
        cancel: &CancellationToken,
    ) -> WatchdogOutcome {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    trace!("watchdog cancelled");
                    return WatchdogOutcome::Cancelled;
                }
                pinged = tokio::time::timeout(self.timeout, signal.wait()) => {
                    if pinged.is_err() {
                        debug!(timeout = ?self.timeout, "watchdog expired");
                        return WatchdogOutcome::Expired;
                    }
                    trace!("watchdog pinged");
                }
            }
        }
    }
}
