//! Installs job files as their owning user and reloads them.

use std::io;
use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::error::{Result, VerifyError};
use crate::identity::{ScenarioIdentity, with_effective_identity, write_file};
use crate::jobfile::JobFile;
use crate::scheduler::SchedulerCli;

/// Writes per-user job files and triggers reloads.
pub struct JobFileInstaller {
    scheduler: Arc<SchedulerCli>,
}

impl JobFileInstaller {
    /// An installer reloading through `scheduler`.
    #[must_use]
    pub const fn new(scheduler: Arc<SchedulerCli>) -> Self {
        Self { scheduler }
    }

    /// Write `contents` as `target`'s job file, overwriting any previous
    /// one, then reload as `target`.
    ///
    /// Returns the number of jobs the scheduler reports loading.
    ///
    /// # Errors
    ///
    /// Returns a privilege-switch, write, reload, or output-format failure.
    /// The effective identity is always restored before an error is
    /// returned.
    pub fn install(&self, target: &ScenarioIdentity, contents: &str) -> Result<u32> {
        let identity = &target.identity;
        tracing::info!(user = %identity.name, path = %target.jobfile.display(), "installing job file");

        if identity.is_current() {
            write_file(&target.jobfile, contents)?;
        } else {
            with_effective_identity(identity, || write_file(&target.jobfile, contents))?;
        }

        self.scheduler.reload(Some(identity))
    }

    /// Render and install `jobfile`.
    ///
    /// # Errors
    ///
    /// See [`install`](Self::install).
    pub fn install_jobfile(&self, target: &ScenarioIdentity, jobfile: &JobFile) -> Result<u32> {
        self.install(target, &jobfile.render())
    }

    /// Remove `target`'s job file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Io`] if the file exists but cannot be removed.
    pub fn uninstall(&self, target: &ScenarioIdentity) -> Result<()> {
        match std::fs::remove_file(&target.jobfile) {
            Ok(()) => {
                tracing::debug!(path = %target.jobfile.display(), "removed job file");
                Ok(())
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(VerifyError::io("remove", &target.jobfile, source)),
        }
    }

    /// Remove the job file of every identity in `identities`.
    ///
    /// # Errors
    ///
    /// Returns the first lookup or removal failure.
    pub fn uninstall_all(&self, identities: &[IdentityConfig]) -> Result<()> {
        for config in identities {
            self.uninstall(&ScenarioIdentity::resolve(config)?)?;
        }
        Ok(())
    }
}
