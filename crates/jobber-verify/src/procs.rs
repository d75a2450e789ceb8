//! Worker process introspection.
//!
//! Workers run unprivileged on behalf of each user. None of them may hold a
//! controlling terminal: a process with a tty can push characters back into
//! its input queue (`TIOCSTI`), which lets an unprivileged job inject
//! commands into a privileged session.

use std::fmt;
use std::sync::Arc;

use crate::command::{CommandRunner, Invocation};
use crate::error::{Result, VerifyError};

/// `ps` prints this when a process has no controlling terminal.
const NO_TTY: &str = "?";

/// The controlling terminal of a process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Terminal {
    /// Detached.
    None,
    /// Attached to the named device, e.g. `pts/0`.
    Device(String),
}

impl Terminal {
    fn parse(field: &str) -> Self {
        if field == NO_TTY {
            Self::None
        } else {
            Self::Device(field.to_string())
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str(NO_TTY),
            Self::Device(name) => f.write_str(name),
        }
    }
}

/// Ownership and terminal facts about one worker process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessRecord {
    /// Owning uid.
    pub owner_uid: u32,
    /// Controlling terminal.
    pub controlling_terminal: Terminal,
}

impl fmt::Display for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.owner_uid, self.controlling_terminal)
    }
}

/// Worker processes in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    records: Vec<ProcessRecord>,
}

impl ProcessSnapshot {
    /// Build a snapshot, sorting `records` into canonical order.
    #[must_use]
    pub fn new(mut records: Vec<ProcessRecord>) -> Self {
        records.sort();
        Self { records }
    }

    /// Parse `ps -o uid,tty` output, header included.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::UnexpectedOutputFormat`] for rows that do not
    /// hold a numeric uid followed by a tty.
    pub fn parse(output: &str) -> Result<Self> {
        let records = output
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .map(|line| parse_row(line, output))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(records))
    }

    /// Records in canonical order.
    #[must_use]
    pub fn records(&self) -> &[ProcessRecord] {
        &self.records
    }

    /// Number of worker processes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no worker is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Display for ProcessSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{record}")?;
        }
        Ok(())
    }
}

fn parse_row(line: &str, output: &str) -> Result<ProcessRecord> {
    let malformed = |reason: String| VerifyError::UnexpectedOutputFormat {
        command: "ps".to_string(),
        reason,
        output: output.to_string(),
    };
    let mut fields = line.split_whitespace();
    let (Some(uid), Some(tty), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(malformed(format!("expected 'uid tty' row, got {line:?}")));
    };
    let owner_uid = uid
        .parse()
        .map_err(|_| malformed(format!("non-numeric uid {uid:?}")))?;
    Ok(ProcessRecord {
        owner_uid,
        controlling_terminal: Terminal::parse(tty),
    })
}

/// Enumerates worker processes through `ps`.
pub struct ProcessInspector {
    runner: Arc<dyn CommandRunner>,
    worker_process: String,
}

impl ProcessInspector {
    /// An inspector for processes named `worker_process`.
    pub fn new(runner: Arc<dyn CommandRunner>, worker_process: impl Into<String>) -> Self {
        Self {
            runner,
            worker_process: worker_process.into(),
        }
    }

    /// Snapshot every process named after the worker program.
    ///
    /// `ps` exits 1 when nothing matches; that is an empty snapshot, not a
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the `ps` failure or a parse failure.
    pub fn snapshot_worker_processes(&self) -> Result<ProcessSnapshot> {
        let invocation = Invocation::new("ps")
            .args(["-C", self.worker_process.as_str(), "-o", "uid,tty"]);
        let output = self.runner.run(&invocation)?;
        if output.exit_code == Some(1) && output.stdout.lines().skip(1).all(|l| l.trim().is_empty()) {
            return Ok(ProcessSnapshot::default());
        }
        let stdout = output.into_checked(&invocation)?;
        ProcessSnapshot::parse(&stdout)
    }
}

/// Fail if the two snapshots differ.
///
/// # Errors
///
/// Returns [`VerifyError::ProcessCountChanged`] with both snapshots.
pub fn assert_stable(before: &ProcessSnapshot, after: &ProcessSnapshot) -> Result<()> {
    let (before, after) = (before.to_string(), after.to_string());
    if before == after {
        return Ok(());
    }
    Err(VerifyError::ProcessCountChanged { before, after })
}

/// Fail if any worker has a controlling terminal.
///
/// # Errors
///
/// Returns [`VerifyError::SecurityInvariantViolation`] naming the first
/// offending record.
pub fn assert_no_controlling_terminal(snapshot: &ProcessSnapshot) -> Result<()> {
    match snapshot
        .records()
        .iter()
        .find(|record| record.controlling_terminal != Terminal::None)
    {
        Some(offending) => Err(VerifyError::SecurityInvariantViolation {
            offending: offending.to_string(),
            snapshot: snapshot.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::testing::ScriptedRunner;

    #[test]
    fn parse_sorts_and_skips_blank_rows() {
        let snapshot = ProcessSnapshot::parse("  UID TT\n 1000 ?\n    0 ?\n\n").unwrap();
        assert_eq!(snapshot.to_string(), "0 ?\n1000 ?");
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn parse_rejects_garbage_rows() {
        for output in ["UID TT\nroot ?", "UID TT\n1000", "UID TT\n1000 ? extra"] {
            let err = ProcessSnapshot::parse(output).unwrap_err();
            assert!(matches!(err, VerifyError::UnexpectedOutputFormat { .. }), "{output:?}");
        }
    }

    #[test]
    fn snapshot_runs_ps_for_worker() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&["ps"], CommandOutput::ok("  UID TT\n 1000 ?\n"));
        let inspector = ProcessInspector::new(runner.clone(), "jobberrunner");

        let snapshot = inspector.snapshot_worker_processes().unwrap();
        assert_eq!(snapshot.records()[0].owner_uid, 1000);
        assert_eq!(runner.command_lines(), ["ps -C jobberrunner -o uid,tty"]);
    }

    #[test]
    fn no_matching_process_is_empty_snapshot() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            &["ps"],
            CommandOutput {
                exit_code: Some(1),
                stdout: "  UID TT\n".to_string(),
                stderr: String::new(),
            },
        );
        let snapshot = ProcessInspector::new(runner, "jobberrunner")
            .snapshot_worker_processes()
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn ps_usage_error_is_surfaced() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&["ps"], CommandOutput::failed(2, "error: garbage option"));
        let err = ProcessInspector::new(runner, "jobberrunner")
            .snapshot_worker_processes()
            .unwrap_err();
        assert!(matches!(err, VerifyError::CommandFailure { exit_code: Some(2), .. }));
    }

    #[test]
    fn stable_snapshots_pass() {
        let a = ProcessSnapshot::parse("UID TT\n0 ?\n1000 ?").unwrap();
        let b = ProcessSnapshot::parse("UID TT\n1000 ?\n0 ?").unwrap();
        assert_stable(&a, &b).unwrap();
    }

    #[test]
    fn churn_is_reported_with_both_snapshots() {
        let a = ProcessSnapshot::parse("UID TT\n0 ?\n1000 ?").unwrap();
        let b = ProcessSnapshot::parse("UID TT\n0 ?").unwrap();
        match assert_stable(&a, &b).unwrap_err() {
            VerifyError::ProcessCountChanged { before, after } => {
                assert_eq!(before, "0 ?\n1000 ?");
                assert_eq!(after, "0 ?");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn terminal_check_flags_attached_worker() {
        let snapshot = ProcessSnapshot::new(vec![
            ProcessRecord {
                owner_uid: 0,
                controlling_terminal: Terminal::None,
            },
            ProcessRecord {
                owner_uid: 1000,
                controlling_terminal: Terminal::Device("pts/3".to_string()),
            },
        ]);
        match assert_no_controlling_terminal(&snapshot).unwrap_err() {
            VerifyError::SecurityInvariantViolation { offending, snapshot } => {
                assert_eq!(offending, "1000 pts/3");
                assert_eq!(snapshot, "0 ?\n1000 pts/3");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn terminal_check_passes_detached_and_empty() {
        assert_no_controlling_terminal(&ProcessSnapshot::default()).unwrap();
        let snapshot = ProcessSnapshot::parse("UID TT\n0 ?\n1000 ?").unwrap();
        assert_no_controlling_terminal(&snapshot).unwrap();
    }
}
