//! Control-sequence filter for captured output, using the VTE crate.
//!
//! The small screen renders plain text only. The filter runs the byte
//! stream through a VTE state machine and keeps printable characters and
//! line terminators; escape, CSI, OSC and DCS sequences are discarded
//! without being interpreted. Parser state persists across calls, so a
//! sequence or UTF-8 character split between two reads is still handled.

use vte::Perform;

/// Streaming filter from raw child output to displayable text.
pub struct OutputFilter {
    parser: vte::Parser,
    sink: TextSink,
}

impl std::fmt::Debug for OutputFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFilter").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct TextSink {
    text: String,
}

impl Perform for TextSink {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.text.push('\n'),
            b'\r' => self.text.push('\r'),
            b'\t' => self.text.push(' '),
            _ => {}
        }
    }
}

impl OutputFilter {
    /// Create a filter in the ground state.
    pub fn new() -> Self {
        Self {
            parser: vte::Parser::new(),
            sink: TextSink::default(),
        }
    }

    /// Feed `bytes` and return the text they completed.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        for byte in bytes {
            self.parser.advance(&mut self.sink, *byte);
        }
        std::mem::take(&mut self.sink.text)
    }
}

impl Default for OutputFilter {
    fn default() -> Self {
        Self::new()
    }
}
