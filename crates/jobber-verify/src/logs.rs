//! Diagnostic log aggregation and crash detection.
//!
//! Diagnostics are collected when something has already gone wrong, so no
//! source here is allowed to fail the collection: an unreadable source
//! becomes a bracketed placeholder in the bundle.
//!
//! Crash detection is a substring match on `panic`. This is deliberately
//! coarse; any log line that merely mentions the word counts as a crash.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::unistd::{Uid, User};

use crate::config::VerifyConfig;
use crate::error::{Result, VerifyError};
use crate::init_system::InitSystemAdapter;

const CRASH_MARKER: &str = "panic";

/// Where a piece of diagnostic text came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSource {
    /// Init-system status of the service.
    ServiceStatus,
    /// Recent log lines of the master process.
    MasterLog,
    /// Users with a live worker socket.
    RunnerSockets,
    /// A worker's log file.
    WorkerLog(PathBuf),
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceStatus => f.write_str("Jobber service status"),
            Self::MasterLog => f.write_str("jobbermaster logs"),
            Self::RunnerSockets => f.write_str("jobberrunner sockets"),
            Self::WorkerLog(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Diagnostic text keyed by source, assembled fresh per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBundle {
    entries: BTreeMap<LogSource, String>,
}

impl LogBundle {
    /// Text for `source`, if collected.
    #[must_use]
    pub fn get(&self, source: &LogSource) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    /// All entries in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&LogSource, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    fn insert(&mut self, source: LogSource, text: String) {
        self.entries.insert(source, text);
    }
}

impl fmt::Display for LogBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (source, text)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            write!(f, "{source}:\n{text}")?;
        }
        Ok(())
    }
}

/// Collects logs from the init system and worker log files.
pub struct LogAggregator {
    adapter: Arc<InitSystemAdapter>,
    recent_lines: usize,
    runner_socket_root: PathBuf,
}

impl LogAggregator {
    /// An aggregator reading service logs through `adapter`.
    #[must_use]
    pub fn new(adapter: Arc<InitSystemAdapter>, config: &VerifyConfig) -> Self {
        Self {
            adapter,
            recent_lines: config.logs.recent_lines,
            runner_socket_root: config.logs.runner_socket_root.clone(),
        }
    }

    /// Gather service status, master logs, runner sockets, and each worker
    /// log. Never fails.
    #[must_use]
    pub fn collect_diagnostics(&self, service: &str, worker_logs: &[PathBuf]) -> LogBundle {
        let mut bundle = LogBundle::default();
        bundle.insert(
            LogSource::ServiceStatus,
            degrade(self.adapter.status(service)),
        );
        bundle.insert(
            LogSource::MasterLog,
            degrade(self.adapter.query_recent_logs(service, self.recent_lines)),
        );
        bundle.insert(
            LogSource::RunnerSockets,
            degrade(runner_socket_users(&self.runner_socket_root).map(|users| users.join("\n"))),
        );
        for path in worker_logs {
            bundle.insert(LogSource::WorkerLog(path.clone()), degrade(read_log(path)));
        }
        bundle
    }

    /// Whether the master's log mentions a panic anywhere. Unreadable logs
    /// count as no crash.
    #[must_use]
    pub fn master_has_crashed(&self, service: &str) -> bool {
        self.master_crash_log(service).is_some()
    }

    /// Fail if the master's log mentions a panic anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ComponentCrashed`] carrying the logs.
    pub fn assert_master_not_crashed(&self, service: &str, component: &str) -> Result<()> {
        match self.master_crash_log(service) {
            Some(log) => Err(VerifyError::ComponentCrashed {
                component: component.to_string(),
                log,
            }),
            None => Ok(()),
        }
    }

    // A panic prints its stack trace after the marker, so the whole journal
    // is searched rather than the diagnostic window.
    fn master_crash_log(&self, service: &str) -> Option<String> {
        self.adapter
            .query_all_logs(service)
            .ok()
            .filter(|log| mentions_crash(log))
    }
}

/// Whether the worker log at `path` mentions a panic. A missing or
/// unreadable file counts as no crash.
#[must_use]
pub fn worker_has_crashed(path: &Path) -> bool {
    worker_crash_log(path).is_some()
}

/// Fail if the worker log at `path` mentions a panic.
///
/// # Errors
///
/// Returns [`VerifyError::ComponentCrashed`] carrying the log.
pub fn assert_worker_not_crashed(path: &Path, component: &str) -> Result<()> {
    match worker_crash_log(path) {
        Some(log) => Err(VerifyError::ComponentCrashed {
            component: component.to_string(),
            log,
        }),
        None => Ok(()),
    }
}

fn worker_crash_log(path: &Path) -> Option<String> {
    read_log(path).ok().filter(|log| mentions_crash(log))
}

/// The crash heuristic.
#[must_use]
pub fn mentions_crash(text: &str) -> bool {
    text.contains(CRASH_MARKER)
}

/// Names of users owning a `<root>/<uid>/socket`. Directories whose name is
/// not a known uid are skipped.
///
/// # Errors
///
/// Returns [`VerifyError::Io`] if `root` cannot be listed.
pub fn runner_socket_users(root: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(root).map_err(|source| VerifyError::io("read", root, source))?;
    let mut users: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.path().join("socket").exists())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter_map(|uid| User::from_uid(Uid::from_raw(uid)).ok().flatten())
        .map(|user| user.name)
        .collect();
    users.sort();
    Ok(users)
}

fn read_log(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| VerifyError::io("read", path, source))
}

fn degrade(result: Result<String>) -> String {
    result.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "diagnostic source unavailable");
        format!("[{err}]")
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use nix::unistd::geteuid;

    use super::*;
    use crate::command::CommandOutput;
    use crate::init_system::InitSystem;
    use crate::testing::ScriptedRunner;

    fn aggregator(runner: Arc<ScriptedRunner>, socket_root: &Path) -> LogAggregator {
        let mut config = VerifyConfig::default();
        config.logs.runner_socket_root = socket_root.to_path_buf();
        let adapter = InitSystemAdapter::with_init_system(
            runner,
            InitSystem::Systemd {
                systemctl: PathBuf::from("/bin/systemctl"),
            },
            &config,
        );
        LogAggregator::new(Arc::new(adapter), &config)
    }

    #[test]
    fn diagnostics_degrade_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("root.log");
        std::fs::write(&present, "runner started\n").unwrap();
        let missing = dir.path().join("normuser.log");

        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond(&["/bin/systemctl", "status"], CommandOutput::failed(3, "inactive"))
            .respond(&["journalctl"], CommandOutput::ok("master up"));
        let bundle = aggregator(runner, &dir.path().join("no-sockets"))
            .collect_diagnostics("jobber", &[present.clone(), missing.clone()]);

        assert!(bundle.get(&LogSource::ServiceStatus).unwrap().starts_with('['));
        assert_eq!(bundle.get(&LogSource::MasterLog), Some("master up"));
        assert!(bundle.get(&LogSource::RunnerSockets).unwrap().starts_with('['));
        assert_eq!(
            bundle.get(&LogSource::WorkerLog(present)),
            Some("runner started\n")
        );
        assert!(bundle.get(&LogSource::WorkerLog(missing)).unwrap().starts_with("[read"));
    }

    #[test]
    fn bundle_renders_titled_sections_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond(&["/bin/systemctl"], CommandOutput::ok("active"))
            .respond(&["journalctl"], CommandOutput::ok("hello"));
        let rendered = aggregator(runner, dir.path())
            .collect_diagnostics("jobber", &[])
            .to_string();

        assert_eq!(
            rendered,
            "Jobber service status:\nactive\n\njobbermaster logs:\nhello\n\njobberrunner sockets:\n"
        );
    }

    #[test]
    fn bundle_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("worker.log");
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&[], CommandOutput::ok(""));
        let agg = aggregator(runner, dir.path());

        let before = agg.collect_diagnostics("jobber", &[log.clone()]);
        std::fs::write(&log, "late line").unwrap();
        let after = agg.collect_diagnostics("jobber", &[log.clone()]);

        assert_ne!(before, after);
        assert_eq!(after.get(&LogSource::WorkerLog(log)), Some("late line"));
    }

    #[test]
    fn master_crash_detection() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&["journalctl"], CommandOutput::ok("panic: runtime error"));
        let agg = aggregator(runner, dir.path());

        assert!(agg.master_has_crashed("jobber"));
        let err = agg.assert_master_not_crashed("jobber", "jobbermaster").unwrap_err();
        assert!(err.to_string().starts_with("jobbermaster crashed"));
    }

    #[test]
    fn master_crash_found_beyond_diagnostic_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = String::from("jobbermaster: panic: runtime error\n");
        for frame in 0..40 {
            journal.push_str("\tgoroutine frame\n");
            journal.push_str(if frame % 2 == 0 { "main.go:12\n" } else { "proc.go:250\n" });
        }
        journal.push_str("systemd[1]: jobber.service: Main process exited\n");
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&["journalctl"], CommandOutput::ok(journal));
        let agg = aggregator(runner.clone(), dir.path());

        assert!(agg.master_has_crashed("jobber"));
        assert_eq!(runner.command_lines(), ["journalctl -u jobber --no-pager"]);
    }

    #[test]
    fn unreadable_master_log_is_not_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(&["journalctl"], CommandOutput::failed(1, "no journal"));
        let agg = aggregator(runner, dir.path());

        assert!(!agg.master_has_crashed("jobber"));
        agg.assert_master_not_crashed("jobber", "jobbermaster").unwrap();
    }

    #[test]
    fn runner_sockets_resolve_to_user_names() {
        let dir = tempfile::tempdir().unwrap();
        let me = geteuid();
        let my_dir = dir.path().join(me.as_raw().to_string());
        std::fs::create_dir(&my_dir).unwrap();
        std::fs::write(my_dir.join("socket"), "").unwrap();
        std::fs::create_dir(dir.path().join("not-a-uid")).unwrap();
        std::fs::create_dir(dir.path().join("4000000000")).unwrap();

        let users = runner_socket_users(dir.path()).unwrap();
        let expected = User::from_uid(me).unwrap().unwrap().name;
        assert_eq!(users, [expected]);
    }
}
