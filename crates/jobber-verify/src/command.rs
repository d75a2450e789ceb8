//! External program invocation.
//!
//! Every program this crate runs goes through a [`CommandRunner`], so every
//! failure carries the command line and both captured streams.

use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use walkdir::WalkDir;

use crate::error::{Result, VerifyError};

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Arguments, not including the program.
    pub args: Vec<String>,
}

impl Invocation {
    /// Create an invocation with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program followed by arguments.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Fully buffered result of a finished program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the program exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Convert a non-zero exit into [`VerifyError::CommandFailure`].
    ///
    /// # Errors
    ///
    /// Returns `CommandFailure` when the exit status is not zero.
    pub fn into_checked(self, invocation: &Invocation) -> Result<String> {
        if !self.success() {
            return Err(VerifyError::CommandFailure {
                args: invocation.argv(),
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
            });
        }
        if !self.stderr.is_empty() {
            tracing::warn!(command = %invocation, stderr = %self.stderr.trim_end(), "STDERR");
        }
        Ok(self.stdout)
    }
}

/// Runs external programs synchronously.
pub trait CommandRunner: Send + Sync {
    /// Run `invocation` to completion, capturing both streams.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::CommandSpawn`] if the program cannot be
    /// started. A non-zero exit is reported in the output, not as an error.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Run `invocation` and return stdout if it exits zero.
    ///
    /// # Errors
    ///
    /// Returns `CommandSpawn` or `CommandFailure`.
    fn run_checked(&self, invocation: &Invocation) -> Result<String> {
        self.run(invocation)?.into_checked(invocation)
    }
}

/// [`CommandRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        tracing::debug!(command = %invocation, "running");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| VerifyError::CommandSpawn {
                program: invocation.program.clone(),
                source,
            })?;
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Locate a program by walking each root in order.
///
/// Returns the first executable regular file named `name`, possibly reached
/// through a symlink. Symlinked directories are not followed while walking,
/// so a tree is never visited twice.
///
/// # Errors
///
/// Returns [`VerifyError::ProgramNotFound`] when no root contains it.
pub fn find_program(name: &str, roots: &[PathBuf]) -> Result<PathBuf> {
    roots
        .iter()
        .find_map(|root| find_in_tree(name, root))
        .ok_or_else(|| VerifyError::ProgramNotFound {
            name: name.to_string(),
            searched: roots.to_vec(),
        })
}

fn find_in_tree(name: &str, root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .find(|entry| entry.file_name() == name && is_executable_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
}

fn is_executable_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}
