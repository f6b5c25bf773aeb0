//! pocket-shell front end
//!
//! Console plumbing for the `pocket-shell` binary: argument parsing,
//! button emulation and incremental line rendering.
//! The binary itself is in main.rs.

pub mod console;

// Re-export commonly used types
pub use console::{Args, Console, Flow, Input};
