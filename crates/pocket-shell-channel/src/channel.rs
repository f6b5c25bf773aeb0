//! Child process transport: a PTY pair (portable-pty) or a plain pipe.

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use std::fs::File;
use std::io::Read;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, error, info, warn};

use pocket_shell_core::{Error, Result, TransportKind};

/// Everything needed to start one external command.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Shell program the command is delegated to
    pub shell: String,
    /// Arguments placed before the command text (usually `-c`)
    pub shell_args: Vec<String>,
    /// Command text, passed verbatim
    pub command: String,
    /// Working directory of the child
    pub cwd: PathBuf,
    /// TERM value for the child
    pub term: String,
    /// Preferred transport
    pub transport: TransportKind,
    /// PTY rows
    pub rows: u16,
    /// PTY columns
    pub cols: u16,
}

/// Result of one non-blocking read attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were placed at the start of the buffer
    Data(usize),
    /// Nothing available right now
    WouldBlock,
    /// The write side is closed; no more output will arrive
    Eof,
    /// Unexpected OS error
    Error(std::io::Error),
}

/// Which processes a signal is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillScope {
    /// Only the direct child (the shell)
    Process,
    /// The child's whole process group, including anything the shell forked
    ProcessGroup,
}

enum ChildProcess {
    Pty(Box<dyn portable_pty::Child + Send + Sync>),
    Pipe(std::process::Child),
}

/// Owned I/O transport and process handle for one running command.
///
/// The child always leads its own process group (`setsid` for PTYs,
/// `setpgid(0, 0)` for pipes), so its pid doubles as the group id.
/// Dropping a channel whose child has not been reaped kills the group and
/// waits for the child. Once the child has exited on its own, nothing is
/// signalled: background members of its group keep running untracked.
pub struct ProcessChannel {
    kind: TransportKind,
    reader: Box<dyn Read + Send>,
    child: ChildProcess,
    pid: Option<u32>,
    exit_code: Option<i32>,
    // Keeps the PTY master open for the lifetime of the reader.
    _master: Option<Box<dyn MasterPty + Send>>,
}

impl std::fmt::Debug for ProcessChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessChannel")
            .field("kind", &self.kind)
            .field("pid", &self.pid)
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}

impl ProcessChannel {
    /// Spawn `request.command` on the preferred transport.
    ///
    /// If a PTY cannot be allocated the command is started on a pipe
    /// instead. A failure to start the process itself is returned as
    /// [`Error::Spawn`] without retrying.
    pub fn spawn(request: &SpawnRequest) -> Result<Self> {
        info!(
            "Spawning command: command='{}', cwd={}, transport={:?}",
            request.command,
            request.cwd.display(),
            request.transport
        );

        match request.transport {
            TransportKind::PseudoTerminal => match Self::spawn_pty(request) {
                Err(Error::PtyError(reason)) => {
                    warn!("PTY unavailable ({}), falling back to pipe transport", reason);
                    Self::spawn_pipe(request)
                }
                other => other,
            },
            TransportKind::Pipe => Self::spawn_pipe(request),
        }
    }

    fn spawn_pty(request: &SpawnRequest) -> Result<Self> {
        // CommandBuilder falls back to $HOME for an unusable cwd; fail like the pipe path.
        if !request.cwd.is_dir() {
            error!("Working directory unavailable: {}", request.cwd.display());
            return Err(Error::Spawn(format!(
                "No such directory: {}",
                request.cwd.display()
            )));
        }

        let pty_system = native_pty_system();

        let pty_size = PtySize {
            rows: request.rows,
            cols: request.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        debug!("Opening PTY {}x{}", request.rows, request.cols);
        let pair = pty_system.openpty(pty_size).map_err(|e| {
            error!("Failed to open PTY: {}", e);
            Error::PtyError(format!("Failed to open PTY: {e}"))
        })?;

        let mut cmd = CommandBuilder::new(&request.shell);
        for arg in &request.shell_args {
            cmd.arg(arg);
        }
        cmd.arg(&request.command);
        cmd.cwd(&request.cwd);
        cmd.env("TERM", &request.term);

        // portable-pty runs setsid() in the child, making it a group leader.
        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!("Failed to spawn '{}': {}", request.command, e);
            Error::Spawn(e.to_string())
        })?;

        // Only the child may hold the slave side, otherwise EOF never arrives.
        drop(pair.slave);

        let reader = pair.master.try_clone_reader().map_err(|e| {
            error!("Failed to clone PTY reader: {}", e);
            Error::PtyError(format!("Failed to clone reader: {e}"))
        })?;

        if let Some(master_fd) = pair.master.as_raw_fd() {
            set_nonblocking(master_fd);
        }

        let pid = child.process_id();
        info!("PTY command spawned: pid={:?}", pid);

        Ok(Self {
            kind: TransportKind::PseudoTerminal,
            reader,
            child: ChildProcess::Pty(child),
            pid,
            exit_code: None,
            _master: Some(pair.master),
        })
    }

    fn spawn_pipe(request: &SpawnRequest) -> Result<Self> {
        let (read_fd, write_fd) = open_pipe()?;
        // SAFETY: both descriptors were just created by pipe(2) and are owned here.
        let read_end = unsafe { File::from_raw_fd(read_fd) };
        let write_end = unsafe { File::from_raw_fd(write_fd) };
        let stderr_end = write_end.try_clone()?;

        set_nonblocking(read_fd);

        let mut cmd = Command::new(&request.shell);
        cmd.args(&request.shell_args)
            .arg(&request.command)
            .current_dir(&request.cwd)
            .env("TERM", &request.term)
            .stdin(Stdio::null())
            .stdout(Stdio::from(write_end))
            .stderr(Stdio::from(stderr_end))
            .process_group(0);

        let child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn '{}': {}", request.command, e);
            Error::Spawn(e.to_string())
        })?;

        // Release the parent's copies of the write end.
        drop(cmd);

        let pid = child.id();
        info!("Pipe command spawned: pid={}", pid);

        Ok(Self {
            kind: TransportKind::Pipe,
            reader: Box::new(read_end),
            child: ChildProcess::Pipe(child),
            pid: Some(pid),
            exit_code: None,
            _master: None,
        })
    }

    /// Transport actually in use (may differ from the request after fallback).
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Child pid, which is also its process group id.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Attempt one non-blocking read into `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        match self.reader.read(buf) {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => {
                debug!("Read {} bytes from {:?} channel", n, self.kind);
                ReadOutcome::Data(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => ReadOutcome::WouldBlock,
            // Linux reports a hung-up PTY master as EIO.
            Err(e)
                if self.kind == TransportKind::PseudoTerminal
                    && e.raw_os_error() == Some(libc::EIO) =>
            {
                ReadOutcome::Eof
            }
            Err(e) => ReadOutcome::Error(e),
        }
    }

    /// Check for child exit without blocking.
    pub fn try_wait(&mut self) -> Result<Option<i32>> {
        if self.exit_code.is_some() {
            return Ok(self.exit_code);
        }

        let code = match &mut self.child {
            ChildProcess::Pty(child) => child
                .try_wait()?
                .map(|status| status.exit_code() as i32),
            ChildProcess::Pipe(child) => child.try_wait()?.map(exit_code_of),
        };

        if let Some(code) = code {
            debug!("Child exited: pid={:?}, code={}", self.pid, code);
            self.exit_code = Some(code);
        }
        Ok(code)
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }

        let code = match &mut self.child {
            ChildProcess::Pty(child) => child.wait()?.exit_code() as i32,
            ChildProcess::Pipe(child) => exit_code_of(child.wait()?),
        };
        self.exit_code = Some(code);
        Ok(code)
    }

    /// Deliver `signal` to the child or its process group.
    ///
    /// Signalling an already-gone process is not an error.
    pub fn signal(&self, scope: KillScope, signal: libc::c_int) -> Result<()> {
        let pid = self
            .pid
            .and_then(|pid| libc::pid_t::try_from(pid).ok())
            .ok_or_else(|| Error::PtyError("Child pid unavailable".to_string()))?;

        let target = match scope {
            KillScope::Process => pid,
            KillScope::ProcessGroup => -pid,
        };

        info!("Sending signal {} to {:?} {}", signal, scope, pid);
        // SAFETY: plain syscall; a negative target addresses the group led by `pid`.
        let rc = unsafe { libc::kill(target, signal) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(Error::Io(err));
            }
            debug!("Signal target {} already gone", target);
        }
        Ok(())
    }

    /// Kill with SIGKILL.
    pub fn kill(&self, scope: KillScope) -> Result<()> {
        self.signal(scope, libc::SIGKILL)
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if self.exit_code.is_some() {
            return;
        }
        if let Ok(Some(_)) = self.try_wait() {
            return;
        }

        warn!("Releasing live channel: pid={:?}, killing process group", self.pid);
        if let Err(e) = self.kill(KillScope::ProcessGroup) {
            error!("Failed to kill process group {:?}: {}", self.pid, e);
        }
        if let Err(e) = self.wait() {
            error!("Failed to reap child {:?}: {}", self.pid, e);
        }
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

fn open_pipe() -> Result<(RawFd, RawFd)> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    // SAFETY: `fds` is a valid two-element array for pipe(2) to fill.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    for fd in fds {
        // SAFETY: fd is one of the descriptors pipe(2) just returned.
        unsafe {
            libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

fn set_nonblocking(fd: RawFd) {
    // SAFETY: fcntl on a descriptor we own; O_NONBLOCK is shared by its dups.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags == -1 {
            error!("Failed to read flags of fd {}", fd);
            return;
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
            error!("Failed to set fd {} to non-blocking mode", fd);
        } else {
            debug!("Set fd {} to non-blocking mode", fd);
        }
    }
}
