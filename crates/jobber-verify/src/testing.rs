//! In-memory [`CommandRunner`] for exercising the engine without a host
//! scheduler.
//!
//! Responses are matched by argv prefix. One-shot responses are consumed in
//! registration order before persistent ones are consulted, which lets a test
//! script "fails twice, then succeeds".

use std::collections::VecDeque;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::error::{Result, VerifyError};

#[derive(Debug)]
struct Rule {
    prefix: Vec<String>,
    output: CommandOutput,
}

impl Rule {
    fn matches(&self, argv: &[String]) -> bool {
        argv.len() >= self.prefix.len() && self.prefix.iter().zip(argv).all(|(p, a)| p == a)
    }
}

#[derive(Debug, Default)]
struct State {
    once: VecDeque<Rule>,
    always: Vec<Rule>,
    calls: Vec<Invocation>,
}

/// Scripted command runner.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    state: Mutex<State>,
}

impl ScriptedRunner {
    /// A runner with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every invocation starting with `prefix` with `output`.
    pub fn respond(&self, prefix: &[&str], output: CommandOutput) -> &Self {
        self.lock().always.push(Rule {
            prefix: prefix.iter().map(ToString::to_string).collect(),
            output,
        });
        self
    }

    /// Answer the next matching invocation only.
    pub fn respond_once(&self, prefix: &[&str], output: CommandOutput) -> &Self {
        self.lock().once.push_back(Rule {
            prefix: prefix.iter().map(ToString::to_string).collect(),
            output,
        });
        self
    }

    /// Every invocation seen so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Invocation> {
        self.lock().calls.clone()
    }

    /// Rendered command lines seen so far.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.lock().calls.iter().map(ToString::to_string).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let argv = invocation.argv();
        let mut state = self.lock();
        state.calls.push(invocation.clone());

        if let Some(pos) = state.once.iter().position(|rule| rule.matches(&argv)) {
            if let Some(rule) = state.once.remove(pos) {
                return Ok(rule.output);
            }
        }
        state
            .always
            .iter()
            .find(|rule| rule.matches(&argv))
            .map(|rule| rule.output.clone())
            .ok_or_else(|| VerifyError::CommandSpawn {
                program: invocation.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no scripted response"),
            })
    }
}

impl CommandOutput {
    /// Successful exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed exit with the given code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Create an empty file at `path` with mode 0755.
pub fn write_executable(path: &Path) {
    std::fs::write(path, "").unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_responses_take_precedence() {
        let runner = ScriptedRunner::new();
        runner
            .respond(&["jobber", "list"], CommandOutput::ok("NAME\nfoo"))
            .respond_once(&["jobber", "list"], CommandOutput::failed(1, "not ready"));

        let inv = Invocation::new("jobber").arg("list");
        assert!(!runner.run(&inv).unwrap().success());
        assert!(runner.run(&inv).unwrap().success());
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn unmatched_invocation_is_spawn_error() {
        let runner = ScriptedRunner::new();
        let err = runner.run(&Invocation::new("ps")).unwrap_err();
        assert!(matches!(err, VerifyError::CommandSpawn { .. }));
        assert_eq!(runner.command_lines(), ["ps"]);
    }
}
