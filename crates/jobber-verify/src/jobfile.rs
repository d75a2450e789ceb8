//! Job-file rendering.
//!
//! The scheduler reads a sectioned document: an optional `[prefs]` block and a
//! `[jobs]` block holding a YAML sequence. Only the fields the acceptance
//! scenarios need are produced.

use std::fmt;

/// Schedule that matches every second.
pub const ALWAYS: &str = "*";

/// One job entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    name: String,
    command: String,
    schedule: String,
    notify_on_error: bool,
}

impl JobDefinition {
    /// A job that runs `command` on every tick and notifies on error.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            schedule: ALWAYS.to_string(),
            notify_on_error: true,
        }
    }

    /// Replace the schedule expression.
    #[must_use]
    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = schedule.into();
        self
    }

    /// Set whether failures invoke the notify program.
    #[must_use]
    pub const fn with_notify_on_error(mut self, notify: bool) -> Self {
        self.notify_on_error = notify;
        self
    }

    /// Job name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command line, opaque to this crate.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Schedule expression.
    #[must_use]
    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    /// Whether failures invoke the notify program.
    #[must_use]
    pub const fn notify_on_error(&self) -> bool {
        self.notify_on_error
    }
}

/// A complete job file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFile {
    notify_program: Option<String>,
    jobs: Vec<JobDefinition>,
}

impl JobFile {
    /// An empty job file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A job file holding exactly one job.
    #[must_use]
    pub fn single(job: JobDefinition) -> Self {
        Self::new().with_job(job)
    }

    /// Append a job.
    #[must_use]
    pub fn with_job(mut self, job: JobDefinition) -> Self {
        self.jobs.push(job);
        self
    }

    /// Set the `notifyProgram` preference.
    #[must_use]
    pub fn with_notify_program(mut self, program: impl Into<String>) -> Self {
        self.notify_program = Some(program.into());
        self
    }

    /// Jobs in file order.
    #[must_use]
    pub fn jobs(&self) -> &[JobDefinition] {
        &self.jobs
    }

    /// Comma-separated job names, the format listing checks expect.
    #[must_use]
    pub fn job_names(&self) -> String {
        self.jobs
            .iter()
            .map(JobDefinition::name)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Render the document.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for JobFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(program) = &self.notify_program {
            writeln!(f, "[prefs]")?;
            writeln!(f, "notifyProgram: {}", SingleQuoted(program))?;
            writeln!(f)?;
        }
        writeln!(f, "[jobs]")?;
        for job in &self.jobs {
            writeln!(f, "- name: {}", SingleQuoted(&job.name))?;
            writeln!(f, "  cmd: {}", SingleQuoted(&job.command))?;
            writeln!(f, "  time: {}", SingleQuoted(&job.schedule))?;
            writeln!(f, "  notifyOnError: {}", job.notify_on_error)?;
        }
        Ok(())
    }
}

/// A YAML single-quoted scalar: taken literally apart from doubled quotes.
struct SingleQuoted<'a>(&'a str);

impl fmt::Display for SingleQuoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0.replace('\'', "''"))
    }
}
