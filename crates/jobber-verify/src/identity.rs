//! OS identities and scoped effective-identity switching.
//!
//! The effective uid/gid is process-wide state. [`EffectiveIdentityGuard`]
//! serialises every switch behind a global lock and restores the original ids
//! on every exit path, including unwinding.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use nix::unistd::{Gid, Uid, User, getegid, geteuid, setegid, seteuid};

use crate::config::IdentityConfig;
use crate::error::{Result, VerifyError};

/// Held for the lifetime of every effective-identity switch.
static SWITCH_LOCK: Mutex<()> = Mutex::new(());

/// An existing OS user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatingIdentity {
    /// User name.
    pub name: String,
    /// User id.
    pub uid: Uid,
    /// Primary group id.
    pub gid: Gid,
    /// Home directory.
    pub home: PathBuf,
}

impl OperatingIdentity {
    /// Resolve `name` through the user database.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::IdentityNotFound`] for unknown users and
    /// [`VerifyError::IdentityLookup`] if the database cannot be read.
    pub fn lookup(name: &str) -> Result<Self> {
        let user = User::from_name(name)
            .map_err(|source| VerifyError::IdentityLookup {
                name: name.to_string(),
                source,
            })?
            .ok_or_else(|| VerifyError::IdentityNotFound {
                name: name.to_string(),
            })?;
        Ok(Self::from(user))
    }

    /// Whether this identity is the process's current effective identity.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.uid == geteuid()
    }

    /// Whether this is the superuser.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.uid.is_root()
    }

    /// Default job file, `<home>/.jobber`.
    #[must_use]
    pub fn default_jobfile(&self) -> PathBuf {
        self.home.join(".jobber")
    }

    /// Default worker log, `<home>/.jobber-log`.
    #[must_use]
    pub fn default_worker_log(&self) -> PathBuf {
        self.home.join(".jobber-log")
    }
}

impl From<User> for OperatingIdentity {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid,
            gid: user.gid,
            home: user.dir,
        }
    }
}

/// A configured identity resolved against the user database, together with
/// its job-file and worker-log locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioIdentity {
    /// The OS user.
    pub identity: OperatingIdentity,
    /// Where this user's job file lives.
    pub jobfile: PathBuf,
    /// Where this user's worker writes its log.
    pub worker_log: PathBuf,
}

impl ScenarioIdentity {
    /// Resolve a configured identity, filling unset paths from its home.
    ///
    /// # Errors
    ///
    /// Returns the lookup failure for unknown users.
    pub fn resolve(config: &IdentityConfig) -> Result<Self> {
        let identity = OperatingIdentity::lookup(&config.name)?;
        Ok(Self::with_defaults(identity, config))
    }

    /// Combine an already-resolved user with its configured paths.
    #[must_use]
    pub fn with_defaults(identity: OperatingIdentity, config: &IdentityConfig) -> Self {
        let jobfile = config
            .jobfile
            .clone()
            .unwrap_or_else(|| identity.default_jobfile());
        let worker_log = config
            .worker_log
            .clone()
            .unwrap_or_else(|| identity.default_worker_log());
        Self {
            identity,
            jobfile,
            worker_log,
        }
    }
}

/// Scoped switch of the effective uid and gid.
///
/// The gid is changed first, while the process still has the privilege to
/// do so, and restored last. Call [`restore`](Self::restore) to observe a
/// failed restore; dropping the guard restores silently and logs failures.
#[must_use = "the original identity is restored when the guard is dropped"]
pub struct EffectiveIdentityGuard {
    saved_uid: Uid,
    saved_gid: Gid,
    restored: bool,
    _lock: MutexGuard<'static, ()>,
}

impl EffectiveIdentityGuard {
    /// Switch the effective ids to `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::PrivilegeSwitch`] if either switch fails. A
    /// partial switch is undone before returning.
    pub fn assume(identity: &OperatingIdentity) -> Result<Self> {
        let lock = SWITCH_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let saved_uid = geteuid();
        let saved_gid = getegid();

        setegid(identity.gid).map_err(|source| VerifyError::PrivilegeSwitch {
            operation: format!("set effective gid to {}", identity.gid),
            source,
        })?;
        if let Err(source) = seteuid(identity.uid) {
            if let Err(restore_err) = setegid(saved_gid) {
                tracing::error!(gid = %saved_gid, error = %restore_err, "failed to restore effective gid");
            }
            return Err(VerifyError::PrivilegeSwitch {
                operation: format!("set effective uid to {}", identity.uid),
                source,
            });
        }

        tracing::debug!(user = %identity.name, uid = %identity.uid, gid = %identity.gid, "assumed effective identity");
        Ok(Self {
            saved_uid,
            saved_gid,
            restored: false,
            _lock: lock,
        })
    }

    /// Return to the original effective ids.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::PrivilegeSwitch`] if either restore fails.
    pub fn restore(mut self) -> Result<()> {
        self.restore_ids()
    }

    fn restore_ids(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        let uid_result = seteuid(self.saved_uid).map_err(|source| VerifyError::PrivilegeSwitch {
            operation: format!("restore effective uid {}", self.saved_uid),
            source,
        });
        // The gid is restored even if the uid restore failed.
        let gid_result = setegid(self.saved_gid).map_err(|source| VerifyError::PrivilegeSwitch {
            operation: format!("restore effective gid {}", self.saved_gid),
            source,
        });
        uid_result.and(gid_result)
    }
}

impl Drop for EffectiveIdentityGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore_ids() {
            tracing::error!(error = %err, "failed to restore effective identity");
        }
    }
}

/// Run `f` with the effective identity switched to `identity`.
///
/// The original ids are restored before `f`'s result is returned, so an
/// error from `f` is never observed while privileges are dropped.
///
/// # Errors
///
/// Returns a switch or restore failure, otherwise `f`'s error.
pub fn with_effective_identity<T>(
    identity: &OperatingIdentity,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let guard = EffectiveIdentityGuard::assume(identity)?;
    let result = f();
    guard.restore()?;
    result
}

/// Write `contents` to `path`, truncating any existing file.
///
/// # Errors
///
/// Returns [`VerifyError::Io`] on failure.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|source| VerifyError::io("write", path, source))
}
