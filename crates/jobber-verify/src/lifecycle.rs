//! Service restart with operational readiness.
//!
//! Service managers report a unit as started before the managed process can
//! answer control queries. Readiness is therefore defined by a probe
//! succeeding, polled at a fixed interval under a hard deadline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::VerifyConfig;
use crate::error::{Result, VerifyError};
use crate::init_system::InitSystemAdapter;
use crate::logs::LogAggregator;

/// Restarts the service and waits for it to become ready.
pub struct ServiceController {
    adapter: Arc<InitSystemAdapter>,
    logs: Arc<LogAggregator>,
    worker_logs: Vec<PathBuf>,
    poll_interval: Duration,
}

impl ServiceController {
    /// A controller that attaches diagnostics from `worker_logs` to restart
    /// failures.
    #[must_use]
    pub fn new(
        adapter: Arc<InitSystemAdapter>,
        logs: Arc<LogAggregator>,
        worker_logs: Vec<PathBuf>,
        config: &VerifyConfig,
    ) -> Self {
        Self {
            adapter,
            logs,
            worker_logs,
            poll_interval: config.lifecycle.poll_interval,
        }
    }

    /// Delay between readiness probes.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Restart `service`, then poll `probe` until it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::RestartFailed`] with diagnostics if the
    /// restart itself fails, or [`VerifyError::ServiceStartTimeout`] if the
    /// probe has not succeeded once `timeout` has elapsed.
    pub fn restart_and_wait_ready<P>(&self, service: &str, probe: P, timeout: Duration) -> Result<()>
    where
        P: FnMut() -> Result<()>,
    {
        if let Err(err) = self.adapter.restart(service) {
            let diagnostics = self.logs.collect_diagnostics(service, &self.worker_logs);
            return Err(VerifyError::RestartFailed {
                source: Box::new(err),
                diagnostics: diagnostics.to_string(),
            });
        }
        wait_ready(probe, timeout, self.poll_interval)
    }
}

/// Poll `probe` every `interval` until it succeeds or `timeout` elapses.
///
/// The probe runs at least once. Sleeps are clamped to the time remaining,
/// so the call returns within `timeout` plus one probe duration.
///
/// # Errors
///
/// Returns [`VerifyError::ServiceStartTimeout`] with the last probe error.
pub fn wait_ready<P>(mut probe: P, timeout: Duration, interval: Duration) -> Result<()>
where
    P: FnMut() -> Result<()>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let last_error = match probe() {
            Ok(()) => {
                tracing::debug!(attempt, "service ready");
                return Ok(());
            },
            Err(err) => err,
        };
        tracing::debug!(attempt, error = %last_error, "service not ready");

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(VerifyError::ServiceStartTimeout {
                timeout,
                last_error: last_error.to_string().trim().to_string(),
            });
        }
        std::thread::sleep(interval.min(remaining));
    }
}
