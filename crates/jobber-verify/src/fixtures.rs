//! Scenario fixtures: a shared temp-file area, permission helpers, and
//! simple text assertions.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::chown as chown_path;

use crate::error::{Result, VerifyError};
use crate::identity::OperatingIdentity;

/// Mode of the temp-file directory: every scenario user may create files.
const AREA_MODE: u32 = 0o777;

/// Mode of each temp file: every scenario user may write it.
const FILE_MODE: u32 = 0o666;

/// A world-writable directory that jobs of every user can write into.
#[derive(Debug)]
pub struct TempFileArea {
    dir: PathBuf,
}

impl TempFileArea {
    /// Create `dir` with mode 0777.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Io`] if it exists already or cannot be made.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir(&dir).map_err(|source| VerifyError::io("create", &dir, source))?;
        set_mode(&dir, AREA_MODE)?;
        Ok(Self { dir })
    }

    /// Attach to an area created earlier, e.g. by another process.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Io`] if `dir` is not an existing directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let metadata =
            std::fs::metadata(&dir).map_err(|source| VerifyError::io("open", &dir, source))?;
        if !metadata.is_dir() {
            return Err(VerifyError::io(
                "open",
                &dir,
                std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
            ));
        }
        Ok(Self { dir })
    }

    /// Area directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Create an empty, persistent file with mode 0666 in the area.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Io`] on failure.
    pub fn make_tempfile(&self) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .tempfile_in(&self.dir)
            .map_err(|source| VerifyError::io("create temp file in", &self.dir, source))?;
        let path = file
            .into_temp_path()
            .keep()
            .map_err(|err| VerifyError::io("persist", err.path.to_path_buf(), err.error))?;
        set_mode(&path, FILE_MODE)?;
        Ok(path)
    }

    /// Delete the area and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Io`] on failure.
    pub fn remove(self) -> Result<()> {
        std::fs::remove_dir_all(&self.dir).map_err(|source| VerifyError::io("remove", &self.dir, source))
    }
}

/// Parse an octal mode such as `"0644"` or `"755"`.
///
/// # Errors
///
/// Returns [`VerifyError::InvalidMode`] for non-octal input or bits above
/// `0o7777`.
pub fn parse_mode(mode: &str) -> Result<u32> {
    u32::from_str_radix(mode.trim(), 8)
        .ok()
        .filter(|bits| *bits <= 0o7777)
        .ok_or_else(|| VerifyError::InvalidMode {
            mode: mode.to_string(),
        })
}

/// Set the permission bits of `path` from an octal string and return the
/// resulting mode.
///
/// # Errors
///
/// Returns `InvalidMode` or [`VerifyError::Io`].
pub fn chmod(path: &Path, mode: &str) -> Result<u32> {
    set_mode(path, parse_mode(mode)?)?;
    let actual = std::fs::metadata(path)
        .map_err(|source| VerifyError::io("stat", path, source))?
        .permissions()
        .mode()
        & 0o777;
    tracing::info!(path = %path.display(), mode = format_args!("{actual:o}"), "changed mode");
    Ok(actual)
}

/// Give `path` to `user` and their primary group.
///
/// # Errors
///
/// Returns the user lookup failure or [`VerifyError::Io`].
pub fn chown(path: &Path, user: &str) -> Result<()> {
    let identity = OperatingIdentity::lookup(user)?;
    chown_path(path, Some(identity.uid), Some(identity.gid))
        .map_err(|errno| VerifyError::io("chown", path, errno.into()))
}

/// Fail unless `text` has exactly `expected` lines. A trailing newline
/// starts an additional, empty line.
///
/// # Errors
///
/// Returns [`VerifyError::LineCountMismatch`], prefixed with `context`.
pub fn assert_line_count(text: &str, expected: usize, context: Option<&str>) -> Result<()> {
    let actual = text.split('\n').count();
    if actual == expected {
        return Ok(());
    }
    Err(VerifyError::LineCountMismatch {
        expected,
        actual,
        context: context.map(|msg| format!("{msg}: ")).unwrap_or_default(),
    })
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    std::fs::set_permissions(path, Permissions::from_mode(mode))
        .map_err(|source| VerifyError::io("chmod", path, source))
}
