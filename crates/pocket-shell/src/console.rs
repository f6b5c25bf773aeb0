//! Line-oriented stand-in for the device screen.
//!
//! Maps stdin lines and Ctrl-C onto engine operations and prints newly
//! appended output lines.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use tracing::{debug, warn};

use pocket_shell_core::{EngineConfig, Error, SessionId, TransportKind};
use pocket_shell_session::{SessionManager, SubmitOutcome};

/// Command-line arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    /// YAML configuration file
    pub config: Option<PathBuf>,
    /// Force the pipe transport
    pub pipe: bool,
}

impl Args {
    /// Parse arguments (without the program name).
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config requires a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--pipe" => parsed.pipe = true,
                other => anyhow::bail!("unknown argument: {other}"),
            }
        }
        Ok(parsed)
    }

    /// Load the configuration these arguments point at.
    pub fn load_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if self.pipe {
            config.session.transport = TransportKind::Pipe;
        }
        Ok(config)
    }
}

/// Console-only inputs standing in for the device buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<'a> {
    /// `:back`, left button
    HistoryBack,
    /// `:fwd`, right button
    HistoryForward,
    /// `:up`, joystick up
    ScrollUp,
    /// `:down`, joystick down
    ScrollDown,
    /// `:status`
    Status,
    /// Anything else goes to the engine
    Submit(&'a str),
}

impl<'a> Input<'a> {
    /// Classify a raw stdin line.
    pub fn parse(line: &'a str) -> Self {
        match line.trim() {
            ":back" => Input::HistoryBack,
            ":fwd" => Input::HistoryForward,
            ":up" => Input::ScrollUp,
            ":down" => Input::ScrollDown,
            ":status" => Input::Status,
            _ => Input::Submit(line),
        }
    }
}

/// Whether the console loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading input
    Continue,
    /// Leave the loop
    Quit,
}

/// One engine session rendered as a scrolling log.
pub struct Console {
    manager: SessionManager,
    session: SessionId,
    shown: Vec<String>,
}

impl Console {
    /// Open a session on `manager`.
    pub fn new(manager: SessionManager) -> anyhow::Result<Self> {
        let session = manager.create_session()?;
        Ok(Self {
            manager,
            session,
            shown: Vec::new(),
        })
    }

    /// Engine behind this console.
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Session this console drives.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Handle one stdin line, writing any console notices to `out`.
    pub fn handle_line(&mut self, line: &str, out: &mut impl Write) -> anyhow::Result<Flow> {
        let id = self.session;
        match Input::parse(line) {
            Input::HistoryBack => {
                writeln!(out, "< {}", self.manager.history_back(&id)?)?;
            }
            Input::HistoryForward => {
                writeln!(out, "> {}", self.manager.history_forward(&id)?)?;
            }
            Input::ScrollUp => {
                self.manager.scroll_up(&id)?;
                self.print_visible(out)?;
            }
            Input::ScrollDown => {
                self.manager.scroll_down(&id)?;
                self.print_visible(out)?;
            }
            Input::Status => {
                let status = self.manager.status(&id)?;
                writeln!(out, "{}", serde_json::to_string(&status)?)?;
            }
            Input::Submit(text) => match self.manager.submit(&id, text) {
                Ok(SubmitOutcome::Exit) => return Ok(Flow::Quit),
                Ok(outcome) => debug!("Submitted {:?}: {:?}", text, outcome),
                Err(Error::SessionBusy(_)) => {
                    warn!("Command still running; cancel it first");
                    writeln!(out, "(busy)")?;
                }
                Err(e) => return Err(e.into()),
            },
        }
        Ok(Flow::Continue)
    }

    fn print_visible(&self, out: &mut impl Write) -> anyhow::Result<()> {
        let rows = self.manager.config().display.visible_rows;
        for line in self.manager.visible_lines(&self.session, rows)? {
            writeln!(out, "| {line}")?;
        }
        Ok(())
    }

    /// Ctrl-C: cancel a running command, or quit when idle.
    pub fn interrupt(&mut self) -> anyhow::Result<Flow> {
        match self.manager.cancel(&self.session) {
            Ok(()) => Ok(Flow::Continue),
            Err(Error::NotRunning(_)) => Ok(Flow::Quit),
            Err(e) => Err(e.into()),
        }
    }

    /// Print output lines appended since the last call.
    pub fn render(&mut self, out: &mut impl Write) -> anyhow::Result<()> {
        let lines = self.manager.lines(&self.session)?;
        for line in appended(&self.shown, &lines) {
            writeln!(out, "{line}")?;
        }
        self.shown = lines;
        Ok(())
    }

    /// Close every session.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

/// Lines of `current` not already shown in `previous`.
///
/// `current` may have lost lines at the front (scrollback cap) or been
/// cleared, so the longest suffix of `previous` that starts `current` is
/// taken as already shown.
pub fn appended<'a>(previous: &[String], current: &'a [String]) -> &'a [String] {
    let max = previous.len().min(current.len());
    (0..=max)
        .rev()
        .find(|&k| previous[previous.len() - k..] == current[..k])
        .map_or(current, |k| &current[k..])
}
