//! # pocket-shell-core
//!
//! Core types for the pocket-shell command session engine.
//!
//! This crate contains the fundamental types with **no internal dependencies**
//! on other pocket-shell crates. It provides:
//!
//! - Session types (SessionId, SessionState, SessionStatus)
//! - Engine configuration loaded from YAML
//! - Display-width text helpers
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other pocket-shell crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod session;
pub mod text;

// Re-export commonly used types
pub use config::{
    DisplaySettings, EngineConfig, EngineSettings, ReaderSettings, SessionSettings, TransportKind,
};
pub use error::{Error, Result};
pub use session::{SessionId, SessionState, SessionStatus};
