//! jobber-verify - acceptance-scenario driver for the jobber scheduler.
//!
//! Each subcommand is one scenario keyword. A failed verification exits
//! non-zero with the full diagnostic in the error message, so shell-based
//! suites can chain keywords with `&&`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobber_verify::fixtures::{self, TempFileArea};
use jobber_verify::{ProcessSnapshot, Verifier, VerifyConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// jobber-verify - acceptance-scenario driver for jobber
#[derive(Parser, Debug)]
#[command(name = "jobber-verify")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to verifier configuration (TOML); defaults to
    /// `$JOBBER_VERIFY_CONFIG`, then built-in defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Service ===
    /// Restart the service and wait until it answers `list`
    Restart,

    /// Print service status, master logs, and worker logs
    DebugInfo,

    /// Fail if the master or any configured worker log mentions a panic
    CrashCheck,

    // === Job files ===
    /// Install a single-job file as USER and print the reload count
    Install {
        /// Owning user
        #[arg(short, long, default_value = "root")]
        user: String,
        /// Job name
        name: String,
        /// Command line
        cmd: String,
        /// Schedule expression
        #[arg(long, default_value = "*")]
        time: String,
        /// Notify program for failed jobs
        #[arg(long)]
        notify_prog: Option<String>,
        /// Fail unless the reload reports this many jobs
        #[arg(long)]
        expect_count: Option<u32>,
    },

    /// Remove every configured user's job file
    RemoveJobfiles,

    // === Listing and job control ===
    /// Check `list` output as USER against comma-separated job names
    List {
        /// User to list as
        #[arg(short, long, default_value = "root")]
        user: String,
        /// Pass `-a` to list every user's jobs
        #[arg(short, long)]
        all: bool,
        /// Only require the listed jobs to include EXPECT
        #[arg(long)]
        contains: bool,
        /// Expected job names, comma-separated
        expect: String,
    },

    /// Pause a job
    Pause {
        /// Job owner
        #[arg(short, long, default_value = "root")]
        user: String,
        /// Job name
        job: String,
    },

    /// Resume a paused job
    Resume {
        /// Job owner
        #[arg(short, long, default_value = "root")]
        user: String,
        /// Job name
        job: String,
    },

    /// Run a job once now
    Test {
        /// Job owner
        #[arg(short, long, default_value = "root")]
        user: String,
        /// Job name
        job: String,
    },

    /// Print the run log
    Log {
        /// User whose log to print
        #[arg(short, long, default_value = "root")]
        user: String,
    },

    // === Workers ===
    /// Print the current worker snapshot (`uid tty` per line)
    Procs,

    /// Fail if the workers differ from a snapshot saved by `procs`
    ProcsSame {
        /// File holding an earlier `procs` output
        snapshot: PathBuf,
    },

    /// Fail if any worker has a controlling terminal
    ProcsNoTty,

    // === Fixtures ===
    /// Temp-file area and permission helpers
    Fixture {
        #[command(subcommand)]
        action: FixtureCommands,
    },
}

/// Fixture subcommands; none of them need jobber to be installed.
#[derive(Subcommand, Debug)]
enum FixtureCommands {
    /// Create the world-writable temp-file directory
    MakeTempDir,

    /// Create an empty world-writable file in the temp directory
    MakeTempFile,

    /// Remove the temp-file directory
    RemoveTempDir,

    /// Set the mode of PATH from an octal string
    Chmod {
        /// File to change
        path: PathBuf,
        /// Octal mode, e.g. 0644
        mode: String,
    },

    /// Give PATH to USER and their primary group
    Chown {
        /// File to change
        path: PathBuf,
        /// New owner
        user: String,
    },

    /// Fail unless a file has exactly N lines
    LineCount {
        /// File to count
        path: PathBuf,
        /// Expected number of lines
        lines: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = VerifyConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(service = %config.scheduler.service, identities = config.identities.len(), "loaded configuration");

    match cli.command {
        // Fixture commands must work before jobber is installed.
        Commands::Fixture { action } => run_fixture(&config, action),
        command => {
            let verifier = Verifier::new(config).context("failed to initialise verifier")?;
            run(&verifier, command)
        },
    }
}

fn run(verifier: &Verifier, command: Commands) -> Result<()> {
    match command {
        Commands::Restart => verifier.restart_service()?,
        Commands::DebugInfo => verifier.print_debug_info(),
        Commands::CrashCheck => {
            verifier.master_should_not_have_crashed()?;
            for identity in &verifier.config().identities {
                verifier.runner_should_not_have_crashed(&identity.name)?;
            }
        },
        Commands::Install {
            user,
            name,
            cmd,
            time,
            notify_prog,
            expect_count,
        } => {
            let contents = verifier.make_jobfile(&name, &cmd, Some(&time), notify_prog.as_deref());
            let count = verifier
                .install_jobfile(&user, &contents)
                .with_context(|| format!("failed to install job file for {user}"))?;
            if let Some(expected) = expect_count {
                anyhow::ensure!(
                    count == expected,
                    "reload loaded {count} jobs, expected {expected}"
                );
            }
            println!("{count}");
        },
        Commands::RemoveJobfiles => verifier.remove_jobfiles()?,
        Commands::List {
            user,
            all,
            contains,
            expect,
        } => {
            if contains {
                verifier.list_should_contain(&user, &expect, all)?;
            } else {
                verifier.list_should_return(&user, &expect, all)?;
            }
        },
        Commands::Pause { user, job } => verifier.pause_job(&user, &job)?,
        Commands::Resume { user, job } => verifier.resume_job(&user, &job)?,
        Commands::Test { user, job } => verifier.test_job(&user, &job)?,
        Commands::Log { user } => print!("{}", verifier.jobber_log(&user)?),
        Commands::Procs => println!("{}", verifier.runner_proc_info()?),
        Commands::ProcsSame { snapshot } => {
            let saved = std::fs::read_to_string(&snapshot)
                .with_context(|| format!("failed to read snapshot {}", snapshot.display()))?;
            // Saved snapshots have no header row.
            let before = ProcessSnapshot::parse(&format!("UID TT\n{saved}"))?;
            verifier.runner_procs_should_be_same(&before)?;
        },
        Commands::ProcsNoTty => verifier.runner_procs_should_not_have_tty()?,
        Commands::Fixture { action } => run_fixture(verifier.config(), action)?,
    }
    Ok(())
}

fn run_fixture(config: &VerifyConfig, action: FixtureCommands) -> Result<()> {
    let dir = config.fixtures.tempfile_dir.clone();
    match action {
        FixtureCommands::MakeTempDir => {
            println!("{}", TempFileArea::create(dir)?.path().display());
        },
        FixtureCommands::MakeTempFile => {
            println!("{}", TempFileArea::open(dir)?.make_tempfile()?.display());
        },
        FixtureCommands::RemoveTempDir => TempFileArea::open(dir)?.remove()?,
        FixtureCommands::Chmod { path, mode } => {
            let actual = fixtures::chmod(&path, &mode)?;
            println!("Mode of {} is now {actual:o}", path.display());
        },
        FixtureCommands::Chown { path, user } => fixtures::chown(&path, &user)?,
        FixtureCommands::LineCount { path, lines } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            fixtures::assert_line_count(&text, lines, Some(&path.display().to_string()))?;
        },
    }
    Ok(())
}
