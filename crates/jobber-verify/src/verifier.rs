//! Scenario-level facade.
//!
//! A [`Verifier`] wires every component from one [`VerifyConfig`] and exposes
//! the keywords acceptance scenarios are written in: install a job file as a
//! user, restart the service, check the listing, check the workers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::{IdentityConfig, VerifyConfig};
use crate::error::Result;
use crate::identity::ScenarioIdentity;
use crate::init_system::InitSystemAdapter;
use crate::installer::JobFileInstaller;
use crate::jobfile::{JobDefinition, JobFile};
use crate::lifecycle::ServiceController;
use crate::listing::{verify_listing, verify_listing_contains};
use crate::logs::{LogAggregator, LogBundle, assert_worker_not_crashed};
use crate::procs::{
    ProcessInspector, ProcessSnapshot, assert_no_controlling_terminal, assert_stable,
};
use crate::scheduler::SchedulerCli;

/// Entry point for acceptance scenarios.
pub struct Verifier {
    config: VerifyConfig,
    scheduler: Arc<SchedulerCli>,
    adapter: Arc<InitSystemAdapter>,
    logs: Arc<LogAggregator>,
    installer: JobFileInstaller,
    controller: ServiceController,
    inspector: ProcessInspector,
}

impl Verifier {
    /// Build a verifier running real programs.
    ///
    /// # Errors
    ///
    /// Returns `ProgramNotFound` if the scheduler is not
    /// installed.
    pub fn new(config: VerifyConfig) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let scheduler = SchedulerCli::locate(runner.clone(), &config)?;
        let adapter = InitSystemAdapter::new(runner.clone(), &config);
        Ok(Self::from_parts(config, runner, scheduler, adapter))
    }

    /// Assemble a verifier from pre-built components.
    #[must_use]
    pub fn from_parts(
        config: VerifyConfig,
        runner: Arc<dyn CommandRunner>,
        scheduler: SchedulerCli,
        adapter: InitSystemAdapter,
    ) -> Self {
        let scheduler = Arc::new(scheduler);
        let adapter = Arc::new(adapter);
        let logs = Arc::new(LogAggregator::new(adapter.clone(), &config));
        let worker_logs = configured_worker_logs(&config);
        let controller = ServiceController::new(adapter.clone(), logs.clone(), worker_logs, &config);
        let inspector = ProcessInspector::new(runner, config.scheduler.worker_process.clone());
        Self {
            installer: JobFileInstaller::new(scheduler.clone()),
            config,
            scheduler,
            adapter,
            logs,
            controller,
            inspector,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// The scheduler CLI.
    #[must_use]
    pub fn scheduler(&self) -> &SchedulerCli {
        &self.scheduler
    }

    /// The init-system adapter.
    #[must_use]
    pub fn init_system(&self) -> &InitSystemAdapter {
        &self.adapter
    }

    /// Resolve a configured identity by user name.
    ///
    /// Users missing from the configuration are resolved with default
    /// paths.
    ///
    /// # Errors
    ///
    /// Returns the user lookup failure.
    pub fn identity(&self, user: &str) -> Result<ScenarioIdentity> {
        match self.config.identity(user) {
            Some(config) => ScenarioIdentity::resolve(config),
            None => ScenarioIdentity::resolve(&IdentityConfig::named(user)),
        }
    }

    /// Restart the service and wait until `list` answers.
    ///
    /// # Errors
    ///
    /// Returns `RestartFailed` or `ServiceStartTimeout`.
    pub fn restart_service(&self) -> Result<()> {
        let scheduler = &self.scheduler;
        self.controller.restart_and_wait_ready(
            &self.config.scheduler.service,
            || scheduler.list(None, false).map(drop),
            self.config.lifecycle.ready_timeout,
        )
    }

    /// Render a single-job file, as most scenarios need.
    #[must_use]
    pub fn make_jobfile(
        &self,
        name: &str,
        cmd: &str,
        time: Option<&str>,
        notify_program: Option<&str>,
    ) -> String {
        let mut job = JobDefinition::new(name, cmd);
        if let Some(time) = time {
            job = job.with_schedule(time);
        }
        let mut file = JobFile::single(job);
        if let Some(program) = notify_program {
            file = file.with_notify_program(program);
        }
        file.render()
    }

    /// Install `contents` as `user`'s job file and return the reload count.
    ///
    /// # Errors
    ///
    /// See [`JobFileInstaller::install`].
    pub fn install_jobfile(&self, user: &str, contents: &str) -> Result<u32> {
        self.installer.install(&self.identity(user)?, contents)
    }

    /// Remove every configured identity's job file.
    ///
    /// # Errors
    ///
    /// Returns the first lookup or removal failure.
    pub fn remove_jobfiles(&self) -> Result<()> {
        self.installer.uninstall_all(&self.config.identities)
    }

    /// `list` as `user` must name exactly `expected` (comma-separated).
    ///
    /// # Errors
    ///
    /// Returns the command failure, `MalformedListing`, or
    /// `ListingMismatch`.
    pub fn list_should_return(&self, user: &str, expected: &str, all_users: bool) -> Result<()> {
        let identity = self.identity(user)?;
        let output = self.scheduler.list(Some(&identity.identity), all_users)?;
        tracing::debug!(user, all_users, %output, "listing");
        verify_listing(&output, expected)
    }

    /// `list` as `user` must include every name in `expected`.
    ///
    /// # Errors
    ///
    /// As [`list_should_return`](Self::list_should_return).
    pub fn list_should_contain(&self, user: &str, expected: &str, all_users: bool) -> Result<()> {
        let identity = self.identity(user)?;
        let output = self.scheduler.list(Some(&identity.identity), all_users)?;
        verify_listing_contains(&output, expected)
    }

    /// Run history of `user`.
    ///
    /// # Errors
    ///
    /// Returns the command failure.
    pub fn jobber_log(&self, user: &str) -> Result<String> {
        self.scheduler.log(Some(&self.identity(user)?.identity))
    }

    /// Pause `job` of `user`.
    ///
    /// # Errors
    ///
    /// Returns the command failure.
    pub fn pause_job(&self, user: &str, job: &str) -> Result<()> {
        self.scheduler.pause(Some(&self.identity(user)?.identity), job)
    }

    /// Resume `job` of `user`.
    ///
    /// # Errors
    ///
    /// Returns the command failure.
    pub fn resume_job(&self, user: &str, job: &str) -> Result<()> {
        self.scheduler.resume(Some(&self.identity(user)?.identity), job)
    }

    /// Run `job` of `user` once.
    ///
    /// # Errors
    ///
    /// Returns the command failure.
    pub fn test_job(&self, user: &str, job: &str) -> Result<()> {
        self.scheduler.test(Some(&self.identity(user)?.identity), job)
    }

    /// Current worker processes.
    ///
    /// # Errors
    ///
    /// Returns the `ps` failure.
    pub fn runner_proc_info(&self) -> Result<ProcessSnapshot> {
        self.inspector.snapshot_worker_processes()
    }

    /// Workers must match an earlier snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ProcessCountChanged` or the `ps` failure.
    pub fn runner_procs_should_be_same(&self, before: &ProcessSnapshot) -> Result<()> {
        assert_stable(before, &self.runner_proc_info()?)
    }

    /// No worker may have a controlling terminal.
    ///
    /// # Errors
    ///
    /// Returns `SecurityInvariantViolation` or the `ps` failure.
    pub fn runner_procs_should_not_have_tty(&self) -> Result<()> {
        assert_no_controlling_terminal(&self.runner_proc_info()?)
    }

    /// Fresh diagnostics for the service and every configured worker log.
    #[must_use]
    pub fn debug_info(&self) -> LogBundle {
        self.logs
            .collect_diagnostics(&self.config.scheduler.service, &configured_worker_logs(&self.config))
    }

    /// Write fresh diagnostics to stdout.
    pub fn print_debug_info(&self) {
        println!("{}", self.debug_info());
    }

    /// The master must not have panicked.
    ///
    /// # Errors
    ///
    /// Returns `ComponentCrashed`.
    pub fn master_should_not_have_crashed(&self) -> Result<()> {
        self.logs.assert_master_not_crashed(
            &self.config.scheduler.service,
            &self.config.scheduler.master_process,
        )
    }

    /// `user`'s worker must not have panicked.
    ///
    /// # Errors
    ///
    /// Returns `ComponentCrashed` or the user lookup failure.
    pub fn runner_should_not_have_crashed(&self, user: &str) -> Result<()> {
        let identity = self.identity(user)?;
        assert_worker_not_crashed(
            &identity.worker_log,
            &format!("{} for {user}", self.config.scheduler.worker_process),
        )
    }
}

/// Worker log paths of every configured identity. Users that cannot be
/// resolved contribute only an explicitly configured path.
fn configured_worker_logs(config: &VerifyConfig) -> Vec<PathBuf> {
    config
        .identities
        .iter()
        .filter_map(|identity| match ScenarioIdentity::resolve(identity) {
            Ok(resolved) => Some(resolved.worker_log),
            Err(err) => {
                tracing::warn!(user = %identity.name, error = %err, "skipping worker log");
                identity.worker_log.clone()
            },
        })
        .collect()
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("scheduler", &self.scheduler.program())
            .field("service", &self.config.scheduler.service)
            .finish_non_exhaustive()
    }
}
