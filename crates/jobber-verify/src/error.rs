//! Error types for verification operations.
//!
//! Every failure that leaves this crate carries the state needed to diagnose
//! the scenario without rerunning it: the offending command line, captured
//! output, or the snapshots being compared.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used throughout the crate.
pub type Result<T, E = VerifyError> = std::result::Result<T, E>;

/// Errors produced by the verification engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    /// A required program is not installed under any search root.
    #[error("cannot find program {name} (searched {searched:?})")]
    ProgramNotFound {
        /// Program name that was searched for.
        name: String,
        /// Roots that were walked.
        searched: Vec<PathBuf>,
    },

    /// The program could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    CommandSpawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The program ran but exited unsuccessfully.
    #[error(
        "{args:?} failed (exit code {exit_code:?}).\nStdout:\n{stdout}\nStderr:\n{stderr}"
    )]
    CommandFailure {
        /// Full argument vector, program first.
        args: Vec<String>,
        /// Exit code, `None` if the child was killed by a signal.
        exit_code: Option<i32>,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },

    /// The service never answered its readiness probe.
    #[error("failed to start service within {timeout:?} (last probe error: {last_error})")]
    ServiceStartTimeout {
        /// Deadline that elapsed.
        timeout: Duration,
        /// Rendering of the last probe failure.
        last_error: String,
    },

    /// The restart command failed; diagnostics were collected at failure time.
    #[error("service restart failed: {source}\n\n{diagnostics}")]
    RestartFailed {
        /// The failure reported by the init system.
        #[source]
        source: Box<VerifyError>,
        /// Rendered diagnostic log bundle.
        diagnostics: String,
    },

    /// A scheduler command produced output that breaks its textual contract.
    #[error("unexpected output from {command}: {reason}: {output:?}")]
    UnexpectedOutputFormat {
        /// Command whose output was being parsed.
        command: String,
        /// What was wrong with it.
        reason: String,
        /// The raw output.
        output: String,
    },

    /// `list` output lacks a header or contains unparseable rows.
    #[error("expected output to have multiple lines: {output:?}")]
    MalformedListing {
        /// The raw output.
        output: String,
    },

    /// The listed job names differ from the expected set.
    #[error("expected listed jobs to be {expected:?}, but was {actual:?}")]
    ListingMismatch {
        /// Names the scenario expected.
        expected: BTreeSet<String>,
        /// Names the scheduler listed.
        actual: BTreeSet<String>,
    },

    /// Worker processes appeared or disappeared between two snapshots.
    #[error("number of runner procs has changed!\nOriginal:\n{before}\nNew:\n{after}")]
    ProcessCountChanged {
        /// Canonical text of the first snapshot.
        before: String,
        /// Canonical text of the second snapshot.
        after: String,
    },

    /// A worker process has a controlling terminal.
    #[error("a runner proc has a controlling tty ({offending})\nRunner procs:\n{snapshot}")]
    SecurityInvariantViolation {
        /// The first offending record.
        offending: String,
        /// Canonical text of the whole snapshot.
        snapshot: String,
    },

    /// A component's log shows a panic.
    #[error("{component} crashed:\n{log}")]
    ComponentCrashed {
        /// Component label, e.g. `jobbermaster`.
        component: String,
        /// Log text that contained the panic.
        log: String,
    },

    /// No such user in the OS identity database.
    #[error("no such user: {name}")]
    IdentityNotFound {
        /// User name that was looked up.
        name: String,
    },

    /// The OS identity database could not be queried.
    #[error("failed to look up user {name}: {source}")]
    IdentityLookup {
        /// User name that was looked up.
        name: String,
        /// Underlying errno.
        #[source]
        source: nix::Error,
    },

    /// Changing or restoring the effective uid/gid failed.
    #[error("failed to {operation}: {source}")]
    PrivilegeSwitch {
        /// Description of the attempted switch.
        operation: String,
        /// Underlying errno.
        #[source]
        source: nix::Error,
    },

    /// A filesystem operation failed.
    #[error("{operation} {path}: {source}")]
    Io {
        /// What was being done.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A file mode string is not valid octal.
    #[error("invalid file mode {mode:?}")]
    InvalidMode {
        /// The rejected mode string.
        mode: String,
    },

    /// A string has the wrong number of lines.
    #[error("{context}Number of lines in string should be {expected}, but was {actual}")]
    LineCountMismatch {
        /// Expected line count.
        expected: usize,
        /// Observed line count.
        actual: usize,
        /// Caller-supplied prefix, empty or ending in `": "`.
        context: String,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl VerifyError {
    /// Builds an [`VerifyError::Io`] for `path`.
    pub(crate) fn io(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
