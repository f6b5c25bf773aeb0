//! # pocket-shell-session
//!
//! Command sessions for the pocket-shell engine.
//!
//! This crate provides:
//! - Output line buffering with wrapping and scrollback
//! - Command history with a browse cursor
//! - Built-in commands (`cd`, `clear`, `pwd`, `exit`)
//! - The per-session state machine and its output reader task
//! - The session registry ([`SessionManager`])
//!
//! ## Architecture
//!
//! This is the top library layer - it depends on pocket-shell-core and
//! pocket-shell-channel, and is driven by the front-end binary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtins;
pub mod history;
pub mod manager;
pub mod output;
mod reader;
pub mod session;

// Re-export commonly used types
pub use builtins::{Command, DirectoryError};
pub use history::CommandHistory;
pub use manager::{SessionInfo, SessionManager};
pub use output::OutputLineBuffer;
pub use session::{Session, SubmitOutcome, DONE_MARKER, STOPPED_MARKER};

pub use pocket_shell_core::{SessionId, SessionState, SessionStatus};
