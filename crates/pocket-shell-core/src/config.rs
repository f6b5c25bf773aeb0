//! Configuration types for the pocket-shell engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Error;

/// Engine configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine-wide settings
    pub engine: EngineSettings,
    /// Screen geometry and output policy
    pub display: DisplaySettings,
    /// Per-session defaults
    pub session: SessionSettings,
    /// Output reader settings
    pub reader: ReaderSettings,
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: EngineConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.engine.max_sessions == 0 {
            return Err(Error::Config("engine.max_sessions must be > 0".into()));
        }

        if self.display.width == 0 || self.display.visible_rows == 0 {
            return Err(Error::Config("display dimensions must be > 0".into()));
        }

        if self.session.shell.trim().is_empty() {
            return Err(Error::Config("session.shell cannot be empty".into()));
        }

        if self.reader.chunk_size == 0 {
            return Err(Error::Config("reader.chunk_size must be > 0".into()));
        }

        if self.reader.poll_interval_ms == 0 {
            return Err(Error::Config("reader.poll_interval_ms must be > 0".into()));
        }

        Ok(())
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            log_level: "info".to_string(),
        }
    }
}

/// Screen geometry and output policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Character columns of the physical screen
    pub width: usize,
    /// Output rows visible at once
    pub visible_rows: usize,
    /// Maximum retained output lines (0 = unbounded)
    pub scrollback_lines: usize,
    /// Drop escape sequences and non-printing controls from captured output
    pub strip_control_sequences: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            width: 21,
            visible_rows: 6,
            scrollback_lines: 1000,
            strip_control_sequences: true,
        }
    }
}

/// Transport used to bind a child's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Pseudo-terminal pair; the child sees an interactive terminal
    #[serde(rename = "pty")]
    PseudoTerminal,
    /// Plain pipes; stdout and stderr share one pipe
    Pipe,
}

/// Per-session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Prompt prepended to echoed commands
    pub prompt: String,
    /// Shell that external commands are delegated to
    pub shell: String,
    /// Arguments placed before the command text
    pub shell_args: Vec<String>,
    /// Preferred transport
    pub transport: TransportKind,
    /// TERM environment variable value
    pub term: String,
    /// Home directory (falls back to $HOME, then "/")
    pub home_dir: Option<PathBuf>,
    /// Maximum retained history entries (0 = unbounded)
    pub history_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            prompt: "pi$ ".to_string(),
            shell: "/bin/sh".to_string(),
            shell_args: vec!["-c".to_string()],
            transport: TransportKind::PseudoTerminal,
            term: "dumb".to_string(),
            home_dir: None,
            history_limit: 100,
        }
    }
}

impl SessionSettings {
    /// Resolve the home directory used for `~` and new sessions.
    pub fn resolve_home(&self) -> PathBuf {
        self.home_dir
            .clone()
            .filter(|p| p.is_absolute())
            .or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .filter(|p| p.is_absolute())
            })
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}

/// Output reader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Maximum bytes per non-blocking read
    pub chunk_size: usize,
    /// Sleep between reads that would block, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            poll_interval_ms: 50,
        }
    }
}

impl ReaderSettings {
    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
