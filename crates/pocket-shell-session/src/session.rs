//! Command session state machine.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use pocket_shell_channel::{KillScope, ProcessChannel, SpawnRequest};
use pocket_shell_core::{
    EngineConfig, Error, Result, SessionId, SessionState, SessionStatus,
};

use crate::builtins::{self, DirectoryError};
use crate::history::CommandHistory;
use crate::output::OutputLineBuffer;
use crate::reader::{self, ReaderOptions};

/// Marker appended when a running command is cancelled.
pub const STOPPED_MARKER: &str = "^C Stopped";

/// Marker appended when a command exits with status 0.
pub const DONE_MARKER: &str = "Done!";

/// Lifecycle phase. The channel lives inside the variants that need it,
/// so a session can never hold one while Idle or Done.
#[derive(Debug)]
pub(crate) enum Phase {
    Idle,
    Running(ProcessChannel),
    Stopping(ProcessChannel),
    Done { exit_code: Option<i32> },
}

impl Phase {
    pub(crate) fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Running(_) => SessionState::Running,
            Phase::Stopping(_) => SessionState::Stopping,
            Phase::Done { .. } => SessionState::Done,
        }
    }

    pub(crate) fn exit_code(&self) -> Option<i32> {
        match self {
            Phase::Done { exit_code } => *exit_code,
            _ => None,
        }
    }

    pub(crate) fn channel_mut(&mut self) -> Option<&mut ProcessChannel> {
        match self {
            Phase::Running(channel) | Phase::Stopping(channel) => Some(channel),
            Phase::Idle | Phase::Done { .. } => None,
        }
    }

    /// Replace the phase with `next`, handing back any owned channel.
    pub(crate) fn transition(&mut self, next: Phase) -> Option<ProcessChannel> {
        match std::mem::replace(self, next) {
            Phase::Running(channel) | Phase::Stopping(channel) => Some(channel),
            Phase::Idle | Phase::Done { .. } => None,
        }
    }
}

/// State shared between the session handle and its reader task.
#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) phase: Phase,
    pub(crate) output: OutputLineBuffer,
    history: CommandHistory,
    working_directory: PathBuf,
    input: String,
    command: Option<String>,
}

impl SessionInner {
    /// Idle state rooted at `home`, with empty output and history.
    pub(crate) fn new(config: &EngineConfig, home: PathBuf) -> Self {
        Self {
            phase: Phase::Idle,
            output: OutputLineBuffer::new(
                config.display.width,
                config.display.visible_rows,
                config.display.scrollback_lines,
            ),
            history: CommandHistory::new(config.session.history_limit),
            working_directory: home,
            input: String::new(),
            command: None,
        }
    }
}

pub(crate) fn lock(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of a submission that was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Input was blank; nothing happened
    Ignored,
    /// A built-in ran to completion
    Builtin,
    /// An external command is now running
    Started,
    /// The process could not be created; an error line was recorded
    SpawnFailed,
    /// The UI should leave this session's screen
    Exit,
}

/// A command session: one working directory, one history, one output
/// buffer and, while a command runs, one channel and reader task.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    inner: Arc<Mutex<SessionInner>>,
    config: Arc<EngineConfig>,
    home: PathBuf,
    runtime: Handle,
    created_at: SystemTime,
}

impl Session {
    /// Create an idle session rooted at `home`.
    ///
    /// Reader tasks are spawned on `runtime`.
    pub fn new(config: Arc<EngineConfig>, home: PathBuf, runtime: Handle) -> Self {
        let id = SessionId::new();
        info!("Creating session: id={}, cwd={}", id, home.display());

        let inner = SessionInner::new(&config, home.clone());

        Self {
            id,
            inner: Arc::new(Mutex::new(inner)),
            config,
            home,
            runtime,
            created_at: SystemTime::now(),
        }
    }

    /// Get the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Get the session creation time.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        lock(&self.inner)
    }

    /// Current state and exit code.
    pub fn status(&self) -> SessionStatus {
        let inner = self.lock();
        SessionStatus::new(inner.phase.state(), inner.phase.exit_code())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lock().phase.state()
    }

    /// Directory external commands start in.
    pub fn working_directory(&self) -> PathBuf {
        self.lock().working_directory.clone()
    }

    /// Text of the current or most recent external command.
    pub fn command(&self) -> Option<String> {
        self.lock().command.clone()
    }

    /// Current input text as set by history navigation.
    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    /// Every output line, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lock().output.lines().to_vec()
    }

    /// Up to `max_rows` lines at the current scroll position.
    pub fn visible_lines(&self, max_rows: usize) -> Vec<String> {
        self.lock().output.visible(max_rows)
    }

    /// Submitted commands, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.lock().history.entries().to_vec()
    }

    /// Load the next older history entry into the input.
    pub fn history_back(&self) -> String {
        let mut inner = self.lock();
        if let Some(entry) = inner.history.back().map(str::to_string) {
            inner.input = entry;
        }
        inner.input.clone()
    }

    /// Load the next newer history entry, or empty input past the newest.
    pub fn history_forward(&self) -> String {
        let mut inner = self.lock();
        if let Some(entry) = inner.history.forward().map(str::to_string) {
            inner.input = entry;
        }
        inner.input.clone()
    }

    /// Scroll one line towards older output.
    pub fn scroll_up(&self) {
        self.lock().output.scroll_up();
    }

    /// Scroll one line towards newer output.
    pub fn scroll_down(&self) {
        self.lock().output.scroll_down();
    }

    /// Common bookkeeping for an accepted submission.
    fn accept(&self, inner: &mut SessionInner, text: &str, echo: bool) {
        if let Phase::Done { .. } = inner.phase {
            inner.phase = Phase::Idle;
        }
        if echo {
            let line = format!("{}{}", self.config.session.prompt, text);
            inner.output.push_line(&line);
        }
        inner.history.push(text);
        inner.input.clear();
        inner.output.reset_scroll();
    }

    /// `cd [path]`. Failures are recorded as one output line.
    pub fn change_directory(&self, text: &str, arg: Option<&str>) {
        let mut inner = self.lock();
        self.accept(&mut inner, text, false);

        let line = match builtins::resolve_directory(arg, &inner.working_directory, &self.home) {
            Ok(dir) => {
                info!("Session {} changed directory to {}", self.id, dir.display());
                let line = if matches!(arg, None | Some("~")) {
                    "-> ~".to_string()
                } else {
                    format!("-> {}", dir.display())
                };
                inner.working_directory = dir;
                line
            }
            Err(DirectoryError::NotFound) => {
                debug!("cd target not found: {:?}", arg);
                format!("No dir: {}", arg.unwrap_or("~"))
            }
            Err(e) => {
                debug!("cd failed: {:?}: {}", arg, e);
                format!("Err: {e}")
            }
        };
        inner.output.push_line(&line);
    }

    /// `clear`: drop every output line.
    pub fn clear(&self, text: &str) {
        let mut inner = self.lock();
        self.accept(&mut inner, text, false);
        inner.output.clear();
    }

    /// `pwd`: append the working directory.
    pub fn print_working_directory(&self, text: &str) {
        let mut inner = self.lock();
        self.accept(&mut inner, text, false);
        let line = inner.working_directory.display().to_string();
        inner.output.push_line(&line);
    }

    /// `exit`: record the submission; leaving the screen is up to the UI.
    pub fn exit(&self, text: &str) {
        let mut inner = self.lock();
        self.accept(&mut inner, text, true);
    }

    /// Start `command` through the configured shell.
    ///
    /// Rejected with [`Error::SessionBusy`] while a command is running; the
    /// rejected text is still echoed and recorded in history. A spawn failure
    /// leaves the session Idle with an `Err:` line.
    pub fn start_external(&self, command: &str) -> Result<SubmitOutcome> {
        let mut inner = self.lock();
        self.accept(&mut inner, command, true);

        if inner.phase.state().has_child() {
            debug!("Rejecting '{}': session {} busy", command, self.id);
            return Err(Error::SessionBusy(self.id));
        }

        let request = self.spawn_request(command, &inner.working_directory);
        match ProcessChannel::spawn(&request) {
            Ok(channel) => {
                if channel.kind() != request.transport {
                    debug!("Session {} running on {:?}", self.id, channel.kind());
                }
                inner.phase = Phase::Running(channel);
                inner.command = Some(command.to_string());
                drop(inner);

                info!("Session status changed: id={}, Idle → Running", self.id);
                self.runtime.spawn(reader::run(
                    self.id,
                    Arc::clone(&self.inner),
                    ReaderOptions::from_config(&self.config),
                ));
                Ok(SubmitOutcome::Started)
            }
            Err(e) => {
                warn!("Session {} failed to start '{}': {}", self.id, command, e);
                let reason = match e {
                    Error::Spawn(reason) | Error::PtyError(reason) => reason,
                    other => other.to_string(),
                };
                inner.output.push_line(&format!("Err:{reason}"));
                Ok(SubmitOutcome::SpawnFailed)
            }
        }
    }

    fn spawn_request(&self, command: &str, cwd: &Path) -> SpawnRequest {
        let settings = &self.config.session;
        SpawnRequest {
            shell: settings.shell.clone(),
            shell_args: settings.shell_args.clone(),
            command: command.to_string(),
            cwd: cwd.to_path_buf(),
            term: settings.term.clone(),
            transport: settings.transport,
            rows: clamp_u16(self.config.display.visible_rows),
            cols: clamp_u16(self.config.display.width),
        }
    }

    /// Request termination of the running command's process group.
    ///
    /// Returns immediately; the session reaches Done once the reader sees
    /// the child exit.
    pub fn cancel(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.phase.state() {
            SessionState::Running => {}
            SessionState::Stopping => {
                // Already cancelled; repeat the signal for stragglers.
                if let Some(channel) = inner.phase.channel_mut() {
                    if let Err(e) = channel.kill(KillScope::ProcessGroup) {
                        error!("Failed to signal session {}: {}", self.id, e);
                    }
                }
                return Ok(());
            }
            state => {
                debug!("Cancel on session {} in state {:?}", self.id, state);
                return Err(Error::NotRunning(self.id));
            }
        }

        if let Some(channel) = inner.phase.transition(Phase::Idle) {
            if let Err(e) = channel.kill(KillScope::ProcessGroup) {
                error!("Failed to signal session {}: {}", self.id, e);
            }
            inner.phase = Phase::Stopping(channel);
        }
        inner.output.push_line(STOPPED_MARKER);
        info!("Session status changed: id={}, Running → Stopping", self.id);
        Ok(())
    }

    /// Kill and reap any running command, leaving the session Done.
    pub fn terminate(&self) {
        let channel = {
            let mut inner = self.lock();
            if inner.phase.state().has_child() {
                inner.phase.transition(Phase::Done { exit_code: None })
            } else {
                None
            }
        };

        if let Some(channel) = channel {
            info!("Terminating session: id={}, pid={:?}", self.id, channel.pid());
            // Dropping an unreaped channel kills its group and waits.
            drop(channel);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn clamp_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}
