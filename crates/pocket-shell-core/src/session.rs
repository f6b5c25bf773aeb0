//! Session identity and lifecycle types shared with the UI layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a command session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a session.
///
/// ```text
/// Idle --start--> Running --cancel--> Stopping
///                    |                   |
///                    +---- exit/EOF -----+--> Done --next submit--> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No command running; ready for input
    Idle,
    /// An external command is running
    Running,
    /// Cancel was requested; waiting for the child to exit
    Stopping,
    /// The last command finished; stable until the next submission
    Done,
}

impl SessionState {
    /// Whether a child process (and its channel) is attached in this state.
    pub fn has_child(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::Stopping)
    }
}

/// Point-in-time status reported to the UI on each redraw tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Current lifecycle state
    pub state: SessionState,
    /// Exit code of the last command, once it terminated
    pub exit_code: Option<i32>,
    /// Shorthand for `state` being Running or Stopping
    pub is_running: bool,
}

impl SessionStatus {
    /// Build a status from a state and optional exit code.
    pub fn new(state: SessionState, exit_code: Option<i32>) -> Self {
        Self {
            state,
            exit_code,
            is_running: state.has_child(),
        }
    }
}
