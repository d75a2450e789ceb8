//! Configuration parsing and management.
//!
//! Describes where the scheduler lives on the host under test: program and
//! service names, the identities that get job files, and the timing of the
//! readiness loop. Every field has a default matching a stock jobber install,
//! so an empty file (or no file at all) is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a configuration file to load when none is
/// passed explicitly.
pub const CONFIG_ENV_VAR: &str = "JOBBER_VERIFY_CONFIG";

/// Maximum length for identity names.
const MAX_IDENTITY_NAME_LENGTH: usize = 32;

/// Top-level verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyConfig {
    /// Scheduler program and process names.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Program search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Service restart and readiness settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Log sources used for diagnostics and crash detection.
    #[serde(default)]
    pub logs: LogsConfig,

    /// Scenario fixture locations.
    #[serde(default)]
    pub fixtures: FixturesConfig,

    /// Identities that own job files.
    #[serde(default = "default_identities")]
    pub identities: Vec<IdentityConfig>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            search: SearchConfig::default(),
            lifecycle: LifecycleConfig::default(),
            logs: LogsConfig::default(),
            fixtures: FixturesConfig::default(),
            identities: default_identities(),
        }
    }
}

impl VerifyConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration from an explicit path, then from
    /// [`CONFIG_ENV_VAR`], then from built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a named file cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(value) if !value.is_empty() => Self::from_file(Path::new(&value)),
            _ => Ok(Self::default()),
        }
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Look up the configuration for a named identity.
    #[must_use]
    pub fn identity(&self, name: &str) -> Option<&IdentityConfig> {
        self.identities.iter().find(|identity| identity.name == name)
    }

    /// Check semantic constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identities.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [[identities]] entry is required".to_string(),
            ));
        }
        for (i, identity) in self.identities.iter().enumerate() {
            validate_identity_name(&identity.name)?;
            if self.identities[..i].iter().any(|other| other.name == identity.name) {
                return Err(ConfigError::Validation(format!(
                    "identity '{}' is listed more than once",
                    identity.name
                )));
            }
        }
        if self.lifecycle.poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "lifecycle.poll_interval must be non-zero".to_string(),
            ));
        }
        if self.logs.recent_lines == 0 {
            return Err(ConfigError::Validation(
                "logs.recent_lines must be non-zero".to_string(),
            ));
        }
        if self.search.roots.is_empty() {
            return Err(ConfigError::Validation(
                "search.roots must name at least one directory".to_string(),
            ));
        }
        if self.scheduler.identity_switch.is_empty() {
            return Err(ConfigError::Validation(
                "scheduler.identity_switch must name a program".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scheduler program and process names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Name of the scheduler CLI, resolved under the search roots.
    #[serde(default = "default_program")]
    pub program: String,

    /// Init-system service name.
    #[serde(default = "default_service")]
    pub service: String,

    /// Process name of the master, used to filter the legacy system log.
    #[serde(default = "default_master_process")]
    pub master_process: String,

    /// Process name of the per-user workers.
    #[serde(default = "default_worker_process")]
    pub worker_process: String,

    /// Command prefix that runs the remainder as another user; the user
    /// name is appended to it.
    #[serde(default = "default_identity_switch")]
    pub identity_switch: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            service: default_service(),
            master_process: default_master_process(),
            worker_process: default_worker_process(),
            identity_switch: default_identity_switch(),
        }
    }
}

/// Program search configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Directory trees walked, in order, when locating a program.
    #[serde(default = "default_search_roots")]
    pub roots: Vec<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            roots: default_search_roots(),
        }
    }
}

/// Service restart and readiness settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// How long to wait for the service to answer after a restart.
    #[serde(default = "default_ready_timeout")]
    #[serde(with = "humantime_serde")]
    pub ready_timeout: Duration,

    /// Delay between readiness probes.
    #[serde(default = "default_poll_interval")]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ready_timeout: default_ready_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Log sources used for diagnostics and crash detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogsConfig {
    /// System message log read on hosts without systemd.
    #[serde(default = "default_system_log")]
    pub system_log: PathBuf,

    /// Number of recent master log lines to fetch.
    #[serde(default = "default_recent_lines")]
    pub recent_lines: usize,

    /// Directory holding one `<uid>/socket` per running worker.
    #[serde(default = "default_runner_socket_root")]
    pub runner_socket_root: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            system_log: default_system_log(),
            recent_lines: default_recent_lines(),
            runner_socket_root: default_runner_socket_root(),
        }
    }
}

/// Scenario fixture locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FixturesConfig {
    /// World-writable directory for scenario temp files.
    #[serde(default = "default_tempfile_dir")]
    pub tempfile_dir: PathBuf,
}

impl Default for FixturesConfig {
    fn default() -> Self {
        Self {
            tempfile_dir: default_tempfile_dir(),
        }
    }
}

/// An identity that owns a job file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// OS user name.
    pub name: String,

    /// Job file path; defaults to `<home>/.jobber`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobfile: Option<PathBuf>,

    /// Worker log path; defaults to `<home>/.jobber-log`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_log: Option<PathBuf>,
}

impl IdentityConfig {
    /// An identity entry with default paths.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobfile: None,
            worker_log: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

fn default_program() -> String {
    "jobber".to_string()
}

fn default_service() -> String {
    "jobber".to_string()
}

fn default_master_process() -> String {
    "jobbermaster".to_string()
}

fn default_worker_process() -> String {
    "jobberrunner".to_string()
}

fn default_identity_switch() -> Vec<String> {
    vec!["sudo".to_string(), "-u".to_string()]
}

fn default_search_roots() -> Vec<PathBuf> {
    ["/bin", "/sbin", "/usr"].into_iter().map(PathBuf::from).collect()
}

const fn default_ready_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_system_log() -> PathBuf {
    PathBuf::from("/var/log/messages")
}

const fn default_recent_lines() -> usize {
    20
}

fn default_runner_socket_root() -> PathBuf {
    PathBuf::from("/var/jobber")
}

fn default_tempfile_dir() -> PathBuf {
    PathBuf::from("/JobberTestTmp")
}

fn default_identities() -> Vec<IdentityConfig> {
    vec![IdentityConfig::named("root"), IdentityConfig::named("normuser")]
}

/// POSIX-portable user name check: a letter or underscore, then
/// alphanumerics, dashes, underscores, or dots.
fn validate_identity_name(name: &str) -> Result<(), ConfigError> {
    let Some(first) = name.chars().next() else {
        return Err(ConfigError::Validation("empty identity name".to_string()));
    };
    if name.len() > MAX_IDENTITY_NAME_LENGTH {
        return Err(ConfigError::Validation(format!(
            "identity name '{name}' exceeds {MAX_IDENTITY_NAME_LENGTH} characters"
        )));
    }
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(ConfigError::Validation(format!(
            "identity name '{name}' must start with a letter or underscore"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && !matches!(ch, '-' | '_' | '.'))
    {
        return Err(ConfigError::Validation(format!(
            "identity name '{name}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = VerifyConfig::from_toml("").unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.lifecycle.ready_timeout, Duration::from_secs(10));
        assert_eq!(config.lifecycle.poll_interval, Duration::from_secs(1));
        assert_eq!(config.logs.recent_lines, 20);
        let names: Vec<_> = config.identities.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["root", "normuser"]);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [scheduler]
            program = "jobber"
            service = "jobber-test"
            identity_switch = ["runuser", "-u"]

            [search]
            roots = ["/opt/jobber"]

            [lifecycle]
            ready_timeout = "30s"
            poll_interval = "250ms"

            [logs]
            system_log = "/var/log/syslog"
            recent_lines = 50

            [[identities]]
            name = "root"

            [[identities]]
            name = "alice"
            jobfile = "/srv/alice/.jobber"
        "#;

        let config = VerifyConfig::from_toml(toml).unwrap();
        assert_eq!(config.scheduler.service, "jobber-test");
        assert_eq!(config.scheduler.identity_switch, ["runuser", "-u"]);
        assert_eq!(config.search.roots, [PathBuf::from("/opt/jobber")]);
        assert_eq!(config.lifecycle.ready_timeout, Duration::from_secs(30));
        assert_eq!(config.lifecycle.poll_interval, Duration::from_millis(250));
        assert_eq!(config.logs.system_log, PathBuf::from("/var/log/syslog"));
        let alice = config.identity("alice").unwrap();
        assert_eq!(alice.jobfile, Some(PathBuf::from("/srv/alice/.jobber")));
        assert_eq!(alice.worker_log, None);
    }

    #[test]
    fn toml_roundtrip_preserves_durations() {
        let config = VerifyConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed = VerifyConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.lifecycle, config.lifecycle);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = VerifyConfig::from_toml("[scheduler]\nprogam = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let err = VerifyConfig::from_toml("[lifecycle]\npoll_interval = \"0s\"\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval"), "got {err}");
    }

    #[test]
    fn rejects_empty_identity_list() {
        let err = VerifyConfig::from_toml("identities = []\n").unwrap_err();
        assert!(err.to_string().contains("identities"), "got {err}");
    }

    #[test]
    fn rejects_duplicate_identity() {
        let toml = r#"
            [[identities]]
            name = "root"
            [[identities]]
            name = "root"
        "#;
        let err = VerifyConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("more than once"), "got {err}");
    }

    #[test]
    fn identity_name_syntax() {
        assert!(validate_identity_name("normuser").is_ok());
        assert!(validate_identity_name("_svc-1.x").is_ok());
        assert!(validate_identity_name("").is_err());
        assert!(validate_identity_name("1user").is_err());
        assert!(validate_identity_name("bad user").is_err());
        assert!(validate_identity_name(&"a".repeat(33)).is_err());
    }

    #[test]
    fn load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verify.toml");
        std::fs::write(&path, "[scheduler]\nservice = \"other\"\n").unwrap();
        let config = VerifyConfig::load(Some(&path)).unwrap();
        assert_eq!(config.scheduler.service, "other");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = VerifyConfig::load(Some(Path::new("/nonexistent/verify.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
