//! Typed wrappers over the scheduler's command-line interface.
//!
//! The scheduler's textual output is an implicit protocol. Each format this
//! crate depends on is parsed in exactly one function here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::{CommandRunner, Invocation, find_program};
use crate::config::VerifyConfig;
use crate::error::{Result, VerifyError};
use crate::identity::OperatingIdentity;

/// Drives the scheduler CLI, optionally as another user.
pub struct SchedulerCli {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    identity_switch: Vec<String>,
}

impl SchedulerCli {
    /// Locate the scheduler program under the configured search roots.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ProgramNotFound`] if it is not installed.
    pub fn locate(runner: Arc<dyn CommandRunner>, config: &VerifyConfig) -> Result<Self> {
        let program = find_program(&config.scheduler.program, &config.search.roots)?;
        tracing::debug!(program = %program.display(), "located scheduler");
        Ok(Self::with_program(runner, program, config))
    }

    /// Use an explicit scheduler path.
    #[must_use]
    pub fn with_program(
        runner: Arc<dyn CommandRunner>,
        program: PathBuf,
        config: &VerifyConfig,
    ) -> Self {
        Self {
            runner,
            program,
            identity_switch: config.scheduler.identity_switch.clone(),
        }
    }

    /// Resolved scheduler path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the invocation of `args`, wrapped in the identity-switch
    /// command when `identity` is not the current effective user.
    ///
    /// Switching the effective uid in this process is not inherited by
    /// children the way a login identity is, so another user's commands
    /// always go through the wrapper.
    #[must_use]
    pub fn invocation(&self, identity: Option<&OperatingIdentity>, args: &[&str]) -> Invocation {
        let program = self.program.display().to_string();
        match identity {
            Some(identity) if !identity.is_current() => {
                let (wrapper, wrapper_args) = self
                    .identity_switch
                    .split_first()
                    .map_or(("sudo", &[][..]), |(w, rest)| (w.as_str(), rest));
                Invocation::new(wrapper)
                    .args(wrapper_args.iter().cloned())
                    .arg(identity.name.clone())
                    .arg(program)
                    .args(args.iter().copied())
            },
            _ => Invocation::new(program).args(args.iter().copied()),
        }
    }

    /// Run `args` as `identity` and return stdout.
    ///
    /// # Errors
    ///
    /// Returns `CommandSpawn` or `CommandFailure`.
    pub fn run(&self, identity: Option<&OperatingIdentity>, args: &[&str]) -> Result<String> {
        self.runner.run_checked(&self.invocation(identity, args))
    }

    /// Reload job files and return the number of jobs loaded.
    ///
    /// # Errors
    ///
    /// Returns the command failure, or `UnexpectedOutputFormat`.
    pub fn reload(&self, identity: Option<&OperatingIdentity>) -> Result<u32> {
        let output = self.run(identity, &["reload"])?;
        let count = parse_reload_count(&output)?;
        tracing::info!(
            user = identity.map_or("<current>", |i| i.name.as_str()),
            count,
            "reloaded job file"
        );
        Ok(count)
    }

    /// List jobs, trimmed of surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns the command failure.
    pub fn list(&self, identity: Option<&OperatingIdentity>, all_users: bool) -> Result<String> {
        let args: &[&str] = if all_users { &["list", "-a"] } else { &["list"] };
        Ok(self.run(identity, args)?.trim().to_string())
    }

    /// Run history.
    ///
    /// # Errors
    ///
    /// Returns the command failure.
    pub fn log(&self, identity: Option<&OperatingIdentity>) -> Result<String> {
        self.run(identity, &["log"])
    }

    /// Pause a job.
    ///
    /// # Errors
    ///
    /// Returns the command failure.
    pub fn pause(&self, identity: Option<&OperatingIdentity>, job: &str) -> Result<()> {
        self.run(identity, &["pause", job]).map(drop)
    }

    /// Resume a paused job.
    ///
    /// # Errors
    ///
    /// Returns the command failure.
    pub fn resume(&self, identity: Option<&OperatingIdentity>, job: &str) -> Result<()> {
        self.run(identity, &["resume", job]).map(drop)
    }

    /// Run a job once, immediately.
    ///
    /// # Errors
    ///
    /// Returns the command failure.
    pub fn test(&self, identity: Option<&OperatingIdentity>, job: &str) -> Result<()> {
        self.run(identity, &["test", job]).map(drop)
    }
}

/// Extract the job count from `reload` output (`"Loaded 3 jobs."`).
///
/// The count is the second whitespace-delimited token.
///
/// # Errors
///
/// Returns [`VerifyError::UnexpectedOutputFormat`] if the token is missing
/// or not a non-negative integer.
pub fn parse_reload_count(output: &str) -> Result<u32> {
    let malformed = |reason: &str| VerifyError::UnexpectedOutputFormat {
        command: "reload".to_string(),
        reason: reason.to_string(),
        output: output.to_string(),
    };
    let token = output
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| malformed("missing job count"))?;
    token
        .parse()
        .map_err(|_| malformed("job count is not an integer"))
}
