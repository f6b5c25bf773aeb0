//! Output reader task: drains a session's channel into its line buffer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info};

use pocket_shell_channel::{OutputFilter, ProcessChannel, ReadOutcome};
use pocket_shell_core::{EngineConfig, SessionId};

use crate::output::OutputLineBuffer;
use crate::session::{lock, Phase, SessionInner, DONE_MARKER};

/// Reads attempted after exit is observed, to pick up output that raced it.
const MAX_DRAIN_READS: usize = 64;

/// Reader tuning taken from the engine config.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReaderOptions {
    pub chunk_size: usize,
    pub poll_interval: Duration,
    pub strip_control_sequences: bool,
}

impl ReaderOptions {
    pub(crate) fn from_config(config: &EngineConfig) -> Self {
        Self {
            chunk_size: config.reader.chunk_size,
            poll_interval: config.reader.poll_interval(),
            strip_control_sequences: config.display.strip_control_sequences,
        }
    }
}

/// What the loop does after one poll.
enum Step {
    /// Data arrived; poll again right away
    Again,
    /// Nothing to read yet
    Sleep,
    /// The run is over; the channel (if still owned) is released by the caller
    Finished(Option<ProcessChannel>),
}

struct Reader {
    buf: Vec<u8>,
    filter: Option<OutputFilter>,
}

impl Reader {
    fn new(settings: ReaderOptions) -> Self {
        Self {
            buf: vec![0u8; settings.chunk_size],
            filter: settings.strip_control_sequences.then(OutputFilter::new),
        }
    }

    /// One non-blocking poll of the channel, under the session lock.
    fn poll(&mut self, id: SessionId, inner: &mut SessionInner) -> Step {
        let Some(channel) = inner.phase.channel_mut() else {
            // Terminated or torn down from the outside.
            debug!("Reader detached: id={}", id);
            return Step::Finished(None);
        };

        match channel.read(&mut self.buf) {
            ReadOutcome::Data(n) => {
                append(&mut self.filter, &mut inner.output, &self.buf[..n]);
                Step::Again
            }
            ReadOutcome::WouldBlock | ReadOutcome::Eof => match channel.try_wait() {
                Ok(Some(code)) => {
                    self.drain(inner);
                    Step::Finished(finish(id, inner, Some(code)))
                }
                Ok(None) => Step::Sleep,
                Err(e) => {
                    error!("Failed to poll child: id={}, {}", id, e);
                    Step::Finished(fail(id, inner, &e.to_string()))
                }
            },
            ReadOutcome::Error(e) => {
                error!("Channel read failed: id={}, {}", id, e);
                Step::Finished(fail(id, inner, &e.to_string()))
            }
        }
    }

    /// Pick up bytes written just before the child exited.
    fn drain(&mut self, inner: &mut SessionInner) {
        for _ in 0..MAX_DRAIN_READS {
            let Some(channel) = inner.phase.channel_mut() else {
                return;
            };
            match channel.read(&mut self.buf) {
                ReadOutcome::Data(n) => {
                    append(&mut self.filter, &mut inner.output, &self.buf[..n])
                }
                _ => return,
            }
        }
    }
}

fn append(filter: &mut Option<OutputFilter>, output: &mut OutputLineBuffer, bytes: &[u8]) {
    match filter {
        Some(filter) => {
            let text = filter.push(bytes);
            output.push_output(text.as_bytes());
        }
        None => output.push_output(bytes),
    }
}

fn finish(id: SessionId, inner: &mut SessionInner, exit_code: Option<i32>) -> Option<ProcessChannel> {
    inner.output.flush_partial();
    match exit_code {
        Some(0) => inner.output.push_line(DONE_MARKER),
        Some(code) => inner.output.push_line(&format!("Exit:{code}")),
        None => {}
    }
    let from = inner.phase.state();
    let channel = inner.phase.transition(Phase::Done { exit_code });
    info!(
        "Session status changed: id={}, {:?} → Done (exit={:?})",
        id, from, exit_code
    );
    channel
}

fn fail(id: SessionId, inner: &mut SessionInner, reason: &str) -> Option<ProcessChannel> {
    inner.output.flush_partial();
    inner.output.push_line(&format!("Err: I/O {reason}"));
    finish(id, inner, None)
}

/// Reader loop for one external run.
///
/// Polls without blocking; the sleep between empty polls is the only
/// suspension point. Exits once the session leaves Running/Stopping.
pub(crate) async fn run(id: SessionId, inner: Arc<Mutex<SessionInner>>, settings: ReaderOptions) {
    debug!("Reader started: id={}", id);
    let mut reader = Reader::new(settings);

    loop {
        let step = {
            let mut guard = lock(&inner);
            reader.poll(id, &mut guard)
        };

        match step {
            Step::Again => tokio::task::yield_now().await,
            Step::Sleep => tokio::time::sleep(settings.poll_interval).await,
            Step::Finished(channel) => {
                // Released outside the lock; an unreaped child is killed here.
                drop(channel);
                break;
            }
        }
    }

    debug!("Reader finished: id={}", id);
}
