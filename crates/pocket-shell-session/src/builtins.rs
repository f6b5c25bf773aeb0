//! Built-in commands handled without spawning a process.

use std::ffi::CString;
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A parsed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `cd [path]`
    ChangeDirectory(Option<&'a str>),
    /// `clear`
    Clear,
    /// `pwd`
    PrintWorkingDirectory,
    /// `exit`
    Exit,
    /// Anything else, delegated verbatim to the shell
    External(&'a str),
}

impl<'a> Command<'a> {
    /// Classify trimmed, non-empty input by its first token.
    ///
    /// Matching is exact and case-sensitive.
    pub fn parse(input: &'a str) -> Self {
        let mut parts = input.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or_default();
        let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

        match first {
            "cd" => Command::ChangeDirectory(rest),
            "clear" => Command::Clear,
            "pwd" => Command::PrintWorkingDirectory,
            "exit" => Command::Exit,
            _ => Command::External(input),
        }
    }
}

/// Why a `cd` target could not be used.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Target does not exist
    #[error("No such directory")]
    NotFound,
    /// Target exists but is not a directory
    #[error("Not a directory")]
    NotADirectory,
    /// Target cannot be entered
    #[error("Permission denied")]
    PermissionDenied,
    /// Any other resolution failure
    #[error("{0}")]
    Other(std::io::Error),
}

impl From<std::io::Error> for DirectoryError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => DirectoryError::NotFound,
            ErrorKind::PermissionDenied => DirectoryError::PermissionDenied,
            _ if err.raw_os_error() == Some(libc::ENOTDIR) => DirectoryError::NotADirectory,
            _ => DirectoryError::Other(err),
        }
    }
}

/// Expand a `cd` argument against the current directory and home.
///
/// No argument and `~` mean home; `~/x` is relative to home; relative
/// paths are joined onto `cwd`.
pub fn expand_target(arg: Option<&str>, cwd: &Path, home: &Path) -> PathBuf {
    match arg {
        None | Some("~") => home.to_path_buf(),
        Some(arg) => match arg.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => cwd.join(arg),
        },
    }
}

/// Resolve a `cd` argument to an absolute, canonical directory that can be entered.
pub fn resolve_directory(
    arg: Option<&str>,
    cwd: &Path,
    home: &Path,
) -> Result<PathBuf, DirectoryError> {
    let target = expand_target(arg, cwd, home);
    let resolved = std::fs::canonicalize(&target)?;

    if !resolved.is_dir() {
        return Err(DirectoryError::NotADirectory);
    }
    if !is_searchable(&resolved) {
        return Err(DirectoryError::PermissionDenied);
    }
    Ok(resolved)
}

fn is_searchable(dir: &Path) -> bool {
    let Ok(path) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `path` is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(path.as_ptr(), libc::X_OK) == 0 }
}
