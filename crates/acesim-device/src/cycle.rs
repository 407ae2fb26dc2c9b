use std::sync::Arc;

use acesim_frame::FrameParser;
use acesim_transport::VirtualSerialEndpoint;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DeviceConfig;
use crate::error::Result;
use crate::session::Session;
use crate::stats::DeviceStats;
use crate::watchdog::{PingSignal, Watchdog, WatchdogOutcome};

/// Why a cycle ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    /// The host went quiet; the next cycle should start.
    WatchdogExpired,
    /// Shutdown was requested.
    Shutdown,
}

enum FirstDone {
    Session(Result<()>),
    Watchdog(WatchdogOutcome),
}

/// Runs the emulator cycle after cycle.
///
/// Each cycle gets a fresh endpoint, parser and ping signal. The session and
/// the watchdog race on the same task; whichever ends first cancels the
/// other, and the endpoint is torn down before the next cycle begins.
#[derive(Debug)]
pub struct Orchestrator {
    config: DeviceConfig,
    stats: Arc<DeviceStats>,
}

impl Orchestrator {
    /// Create an orchestrator, rejecting unusable configuration up front.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stats: Arc::new(DeviceStats::new()),
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Shared counters, updated while the orchestrator runs.
    pub fn stats(&self) -> Arc<DeviceStats> {
        Arc::clone(&self.stats)
    }

    /// Run cycles until `shutdown` fires or a fatal error occurs.
    ///
    /// Watchdog expiry restarts the cycle after `restart_backoff`. Endpoint
    /// resource faults and parser consistency faults are returned as-is and
    /// never retried.
    pub async fn run_forever(&self, shutdown: &CancellationToken) -> Result<()> {
        info!(
            path = ?self.config.device_path(),
            watchdog_timeout = ?self.config.watchdog_timeout,
            restart_backoff = ?self.config.restart_backoff,
            "emulator starting"
        );

        loop {
            match self.run_cycle(shutdown).await? {
                CycleEnd::Shutdown => break,
                CycleEnd::WatchdogExpired => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.restart_backoff) => {}
            }
        }

        info!(stats = ?self.stats.snapshot(), "emulator stopped");
        Ok(())
    }

    /// Run a single cycle: endpoint up, session vs. watchdog, endpoint down.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleEnd> {
        if shutdown.is_cancelled() {
            return Ok(CycleEnd::Shutdown);
        }

        self.stats.record_cycle();
        let mut endpoint = VirtualSerialEndpoint::create(self.config.device_path())?;
        self.stats.record_endpoint_created();
        info!(
            path = ?endpoint.path(),
            device = ?endpoint.consumer_path(),
            "cycle started"
        );

        let signal = PingSignal::new();
        let mut parser = FrameParser::new();
        let mut session = Session::from_config(&self.config, Arc::clone(&self.stats));
        let watchdog = Watchdog::new(self.config.watchdog_timeout);
        let cycle_token = shutdown.child_token();

        let outcome = {
            let session_run = session.run(
                endpoint.controller_mut(),
                &mut parser,
                &signal,
                &cycle_token,
            );
            let watchdog_run = watchdog.supervise(&signal, &cycle_token);
            tokio::pin!(session_run, watchdog_run);

            let first = tokio::select! {
                result = &mut session_run => FirstDone::Session(result),
                outcome = &mut watchdog_run => FirstDone::Watchdog(outcome),
            };
            cycle_token.cancel();

            match first {
                FirstDone::Session(result) => {
                    watchdog_run.await;
                    result.map(|()| CycleEnd::Shutdown)
                }
                FirstDone::Watchdog(outcome) => {
                    let result = session_run.await;
                    result.map(|()| match outcome {
                        WatchdogOutcome::Expired => CycleEnd::WatchdogExpired,
                        WatchdogOutcome::Cancelled => CycleEnd::Shutdown,
                    })
                }
            }
        };

        let closed = endpoint.close();
        self.stats.record_endpoint_destroyed();
        debug!(pings = signal.pings(), stats = ?self.stats.snapshot(), "cycle finished");

        let end = outcome?;
        closed?;

        if end == CycleEnd::WatchdogExpired {
            self.stats.record_watchdog_expiry();
            info!(
                timeout = ?self.config.watchdog_timeout,
                "watchdog expired; restarting endpoint"
            );
        }
        Ok(end)
    }
}
