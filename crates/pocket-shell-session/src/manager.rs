//! Session manager: the engine's public entry point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use tokio::runtime::Handle;
use tracing::{debug, info};

use pocket_shell_core::{EngineConfig, Error, Result, SessionId, SessionState, SessionStatus};

use crate::builtins::Command;
use crate::session::{Session, SubmitOutcome};

/// Registry of command sessions sharing one configuration.
///
/// Every operation addresses a session by id and runs on the caller's
/// thread; only output readers run on the runtime.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
    config: Arc<EngineConfig>,
    home: PathBuf,
    runtime: Handle,
}

impl SessionManager {
    /// Create a manager with default configuration.
    pub fn new(runtime: Handle) -> Self {
        Self::build(EngineConfig::default(), runtime)
    }

    /// Create a manager with custom configuration.
    pub fn with_config(config: EngineConfig, runtime: Handle) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, runtime))
    }

    fn build(config: EngineConfig, runtime: Handle) -> Self {
        let home = config.session.resolve_home();
        info!("Session manager home directory: {}", home.display());
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            home,
            runtime,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new idle session in the home directory.
    pub fn create_session(&self) -> Result<SessionId> {
        let mut sessions = self.write();
        if sessions.len() >= self.config.engine.max_sessions {
            return Err(Error::SessionLimitReached(self.config.engine.max_sessions));
        }

        let session = Session::new(
            Arc::clone(&self.config),
            self.home.clone(),
            self.runtime.clone(),
        );
        let session_id = *session.id();
        sessions.insert(session_id, Arc::new(session));

        Ok(session_id)
    }

    /// Get a session by ID.
    pub fn get_session(&self, session_id: &SessionId) -> Result<Arc<Session>> {
        self.read()
            .get(session_id)
            .cloned()
            .ok_or(Error::SessionNotFound(*session_id))
    }

    /// List all sessions.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.read()
            .values()
            .map(|session| SessionInfo {
                session_id: *session.id(),
                command: session.command(),
                working_directory: session.working_directory(),
                state: session.state(),
                created_at: session.created_at(),
            })
            .collect()
    }

    /// Close a session, killing and reaping any running command.
    pub fn close_session(&self, session_id: &SessionId) -> Result<()> {
        let session = self
            .write()
            .remove(session_id)
            .ok_or(Error::SessionNotFound(*session_id))?;

        info!("Closing session: id={}", session_id);
        session.terminate();
        Ok(())
    }

    /// Close all sessions.
    pub fn close_all(&self) {
        let drained: Vec<Arc<Session>> = self.write().drain().map(|(_, s)| s).collect();
        if !drained.is_empty() {
            info!("Closing {} session(s)", drained.len());
        }
        for session in drained {
            session.terminate();
        }
    }

    /// Tear the engine down. Equivalent to [`close_all`](Self::close_all).
    pub fn shutdown(&self) {
        self.close_all();
    }

    /// Get the number of sessions.
    pub fn session_count(&self) -> usize {
        self.read().len()
    }

    /// Interpret one line of user input.
    ///
    /// Blank input is ignored. `cd`, `clear`, `pwd` and `exit` are handled
    /// in-process; anything else runs through the shell. Fails with
    /// [`Error::SessionBusy`] if a command is already running.
    pub fn submit(&self, session_id: &SessionId, text: &str) -> Result<SubmitOutcome> {
        let session = self.get_session(session_id)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        debug!("Submit: id={}, text={:?}", session_id, text);
        match Command::parse(text) {
            Command::ChangeDirectory(arg) => {
                session.change_directory(text, arg);
                Ok(SubmitOutcome::Builtin)
            }
            Command::Clear => {
                session.clear(text);
                Ok(SubmitOutcome::Builtin)
            }
            Command::PrintWorkingDirectory => {
                session.print_working_directory(text);
                Ok(SubmitOutcome::Builtin)
            }
            Command::Exit => {
                session.exit(text);
                Ok(SubmitOutcome::Exit)
            }
            Command::External(command) => session.start_external(command),
        }
    }

    /// Signal the running command's process group.
    pub fn cancel(&self, session_id: &SessionId) -> Result<()> {
        self.get_session(session_id)?.cancel()
    }

    /// Current state and exit code.
    pub fn status(&self, session_id: &SessionId) -> Result<SessionStatus> {
        Ok(self.get_session(session_id)?.status())
    }

    /// Up to `max_rows` lines at the session's scroll position.
    pub fn visible_lines(&self, session_id: &SessionId, max_rows: usize) -> Result<Vec<String>> {
        Ok(self.get_session(session_id)?.visible_lines(max_rows))
    }

    /// Every retained output line.
    pub fn lines(&self, session_id: &SessionId) -> Result<Vec<String>> {
        Ok(self.get_session(session_id)?.lines())
    }

    /// Load the next older history entry; returns the new input text.
    pub fn history_back(&self, session_id: &SessionId) -> Result<String> {
        Ok(self.get_session(session_id)?.history_back())
    }

    /// Load the next newer history entry; returns the new input text.
    pub fn history_forward(&self, session_id: &SessionId) -> Result<String> {
        Ok(self.get_session(session_id)?.history_forward())
    }

    /// Scroll one line towards older output.
    pub fn scroll_up(&self, session_id: &SessionId) -> Result<()> {
        self.get_session(session_id)?.scroll_up();
        Ok(())
    }

    /// Scroll one line towards newer output.
    pub fn scroll_down(&self, session_id: &SessionId) -> Result<()> {
        self.get_session(session_id)?.scroll_down();
        Ok(())
    }

    /// Directory the next external command starts in.
    pub fn working_directory(&self, session_id: &SessionId) -> Result<PathBuf> {
        Ok(self.get_session(session_id)?.working_directory())
    }

    /// Current input text.
    pub fn input(&self, session_id: &SessionId) -> Result<String> {
        Ok(self.get_session(session_id)?.input())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Information about a session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session ID
    pub session_id: SessionId,

    /// Current or most recent external command
    pub command: Option<String>,

    /// Working directory
    pub working_directory: PathBuf,

    /// Lifecycle state
    pub state: SessionState,

    /// Creation time
    pub created_at: SystemTime,
}
