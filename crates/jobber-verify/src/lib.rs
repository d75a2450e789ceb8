//! # jobber-verify
//!
//! Verification engine for acceptance tests of the jobber scheduler.
//!
//! jobber runs a privileged master (`jobbermaster`) that spawns one
//! unprivileged worker (`jobberrunner`) per user. This crate does not
//! schedule anything; it drives the scheduler's command-line surface,
//! inspects the process table and log files, and asserts on what it sees.
//!
//! ## Components
//!
//! - [`command`]: runs external programs; every failure carries the command
//!   line and captured output
//! - [`init_system`]: systemd or legacy `service` control, probed once
//! - [`logs`]: best-effort diagnostics and crash detection
//! - [`identity`] and [`installer`]: write a job file as its owner, with the
//!   effective uid/gid restored on every path
//! - [`scheduler`]: typed wrappers over `reload`, `list`, `log`, `pause`,
//!   `resume`, and `test`
//! - [`lifecycle`]: restart and poll until the service answers
//! - [`procs`]: worker snapshots and the no-controlling-terminal check
//! - [`listing`]: order-independent checks of `list` output
//!
//! [`Verifier`] composes all of them from a [`VerifyConfig`].
//!
//! ## Example
//!
//! ```no_run
//! use jobber_verify::{Verifier, VerifyConfig};
//!
//! # fn main() -> Result<(), jobber_verify::VerifyError> {
//! let verifier = Verifier::new(VerifyConfig::default())?;
//! verifier.restart_service()?;
//!
//! let before = verifier.runner_proc_info()?;
//! let jobfile = verifier.make_jobfile("foo", "/bin/true", None, None);
//! assert_eq!(verifier.install_jobfile("normuser", &jobfile)?, 1);
//! verifier.list_should_return("normuser", "foo", false)?;
//! verifier.runner_procs_should_be_same(&before)?;
//! verifier.runner_procs_should_not_have_tty()?;
//! verifier.remove_jobfiles()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg(unix)]

pub mod command;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod identity;
pub mod init_system;
pub mod installer;
pub mod jobfile;
pub mod lifecycle;
pub mod listing;
pub mod logs;
pub mod procs;
pub mod scheduler;
#[cfg(test)]
pub(crate) mod testing;
pub mod verifier;

pub use command::{CommandOutput, CommandRunner, Invocation, SystemCommandRunner};
pub use config::{ConfigError, IdentityConfig, VerifyConfig};
pub use error::{Result, VerifyError};
pub use identity::{EffectiveIdentityGuard, OperatingIdentity, ScenarioIdentity};
pub use init_system::{InitSystem, InitSystemAdapter};
pub use installer::JobFileInstaller;
pub use jobfile::{JobDefinition, JobFile};
pub use lifecycle::ServiceController;
pub use listing::{Listing, verify_listing};
pub use logs::{LogAggregator, LogBundle, LogSource};
pub use procs::{ProcessInspector, ProcessRecord, ProcessSnapshot, Terminal};
pub use scheduler::SchedulerCli;
pub use verifier::Verifier;
