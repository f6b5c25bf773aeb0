//! # pocket-shell-channel
//!
//! Child process transport for the pocket-shell engine.
//!
//! This crate provides:
//! - Process spawning on a PTY (portable-pty) or a plain pipe
//! - Non-blocking reads with an explicit `Data | WouldBlock | Eof | Error` result
//! - Process vs process-group signalling
//! - A VTE-based filter that reduces captured bytes to plain text
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on pocket-shell-core
//! and owns every OS process handle the engine creates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod filter;

// Re-export commonly used types
pub use channel::{KillScope, ProcessChannel, ReadOutcome, SpawnRequest};
pub use filter::OutputFilter;
pub use pocket_shell_core::TransportKind;
