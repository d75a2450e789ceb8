//! Init-system detection and service control.
//!
//! Hosts either run systemd or a SysV-style `service` wrapper. The choice is
//! probed once per adapter and never re-examined: the init system cannot
//! change during a test run.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::command::{CommandRunner, Invocation, find_program};
use crate::config::VerifyConfig;
use crate::error::{Result, VerifyError};

/// The service manager present on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitSystem {
    /// systemd, controlled through `systemctl` and queried through
    /// `journalctl`.
    Systemd {
        /// Resolved `systemctl` path.
        systemctl: PathBuf,
    },
    /// Legacy service scripts logging to the system message log.
    Legacy {
        /// Resolved `service` path.
        service: PathBuf,
    },
}

impl InitSystem {
    /// Probe `roots` for `systemctl`, then for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ProgramNotFound`] when neither exists.
    pub fn detect(roots: &[PathBuf]) -> Result<Self> {
        if let Ok(systemctl) = find_program("systemctl", roots) {
            return Ok(Self::Systemd { systemctl });
        }
        match find_program("service", roots) {
            Ok(service) => Ok(Self::Legacy { service }),
            Err(_) => Err(VerifyError::ProgramNotFound {
                name: "systemctl or service".to_string(),
                searched: roots.to_vec(),
            }),
        }
    }

    /// Whether this is systemd.
    #[must_use]
    pub const fn is_systemd(&self) -> bool {
        matches!(self, Self::Systemd { .. })
    }
}

/// Issues service-control commands for whichever init system is present.
pub struct InitSystemAdapter {
    runner: Arc<dyn CommandRunner>,
    roots: Vec<PathBuf>,
    detected: OnceLock<Option<InitSystem>>,
    system_log: PathBuf,
    master_process: String,
}

impl InitSystemAdapter {
    /// An adapter that probes the configured search roots on first use.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, config: &VerifyConfig) -> Self {
        Self {
            runner,
            roots: config.search.roots.clone(),
            detected: OnceLock::new(),
            system_log: config.logs.system_log.clone(),
            master_process: config.scheduler.master_process.clone(),
        }
    }

    /// An adapter with a fixed init system; no probing takes place.
    #[must_use]
    pub fn with_init_system(
        runner: Arc<dyn CommandRunner>,
        init: InitSystem,
        config: &VerifyConfig,
    ) -> Self {
        let adapter = Self::new(runner, config);
        let _ = adapter.detected.set(Some(init));
        adapter
    }

    /// The detected init system.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ProgramNotFound`] if no control binary exists.
    pub fn init_system(&self) -> Result<&InitSystem> {
        self.detected
            .get_or_init(|| {
                let detected = InitSystem::detect(&self.roots).ok();
                tracing::debug!(init_system = ?detected, "probed init system");
                detected
            })
            .as_ref()
            .ok_or_else(|| VerifyError::ProgramNotFound {
                name: "systemctl or service".to_string(),
                searched: self.roots.clone(),
            })
    }

    /// Restart `service`.
    ///
    /// # Errors
    ///
    /// Returns `ProgramNotFound` or the failure of the control command.
    pub fn restart(&self, service: &str) -> Result<()> {
        tracing::info!(service, "restarting service");
        self.runner
            .run_checked(&self.control(service, "restart")?)
            .map(drop)
    }

    /// Status text for `service`.
    ///
    /// # Errors
    ///
    /// Returns `ProgramNotFound` or the failure of the control command.
    pub fn status(&self, service: &str) -> Result<String> {
        self.runner.run_checked(&self.control(service, "status")?)
    }

    /// The last `max_lines` log lines of `service`.
    ///
    /// The legacy message log is shared by every daemon, so only lines
    /// mentioning the master process are kept.
    ///
    /// # Errors
    ///
    /// Returns `ProgramNotFound` or the failure of the log query.
    pub fn query_recent_logs(&self, service: &str, max_lines: usize) -> Result<String> {
        self.query_logs(service, Some(max_lines))
    }

    /// Every retained log line of `service`, unbounded.
    ///
    /// # Errors
    ///
    /// Returns `ProgramNotFound` or the failure of the log query.
    pub fn query_all_logs(&self, service: &str) -> Result<String> {
        self.query_logs(service, None)
    }

    fn query_logs(&self, service: &str, max_lines: Option<usize>) -> Result<String> {
        match self.init_system()? {
            InitSystem::Systemd { .. } => {
                let mut journal = Invocation::new("journalctl").args(["-u", service]);
                if let Some(max_lines) = max_lines {
                    journal = journal.arg("-n").arg(max_lines.to_string());
                }
                self.runner.run_checked(&journal.arg("--no-pager"))
            },
            InitSystem::Legacy { .. } => {
                let system_log = self.system_log.display().to_string();
                let read = match max_lines {
                    Some(max_lines) => Invocation::new("tail")
                        .arg("-n")
                        .arg(max_lines.to_string())
                        .arg(system_log),
                    None => Invocation::new("cat").arg(system_log),
                };
                let text = self.runner.run_checked(&read)?;
                Ok(text
                    .lines()
                    .filter(|line| line.contains(self.master_process.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n"))
            },
        }
    }

    fn control(&self, service: &str, action: &str) -> Result<Invocation> {
        Ok(match self.init_system()? {
            InitSystem::Systemd { systemctl } => {
                Invocation::new(systemctl.display().to_string()).args([action, service])
            },
            InitSystem::Legacy { service: script } => {
                Invocation::new(script.display().to_string()).args([service, action])
            },
        })
    }
}
