//! Error types for the pocket-shell engine.

use thiserror::Error;

use crate::SessionId;

/// Main error type for pocket-shell operations.
///
/// Only contract violations and configuration problems reach the UI as
/// `Err`. Failures that originate in the child process or the filesystem
/// are absorbed by the session and rendered as output lines instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// An external command is already running in the session
    #[error("Session busy: {0}")]
    SessionBusy(SessionId),

    /// Cancel requested but nothing is running
    #[error("No command running in session {0}")]
    NotRunning(SessionId),

    /// Session limit reached
    #[error("Session limit reached (max: {0})")]
    SessionLimitReached(usize),

    /// PTY-related errors
    #[error("PTY error: {0}")]
    PtyError(String),

    /// The OS refused to create the child process
    #[error("Spawn failed: {0}")]
    Spawn(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
