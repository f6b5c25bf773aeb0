//! Display-line buffering of captured output.

use pocket_shell_core::text;

/// Bounded sequence of fixed-width display lines.
///
/// Raw output is accumulated until a line terminator (`\n` or a standalone
/// `\r`) arrives; each terminated segment is trimmed, dropped if empty and
/// otherwise wrapped into chunks of `width` characters. The unterminated
/// remainder stays in an internal accumulator until it is terminated or
/// flushed at process end.
#[derive(Debug, Clone)]
pub struct OutputLineBuffer {
    lines: Vec<String>,
    partial: Vec<u8>,
    scroll_offset: usize,
    width: usize,
    visible_rows: usize,
    max_lines: usize,
}

impl OutputLineBuffer {
    /// Create an empty buffer.
    ///
    /// `max_lines == 0` keeps every line.
    pub fn new(width: usize, visible_rows: usize, max_lines: usize) -> Self {
        Self {
            lines: Vec::new(),
            partial: Vec::new(),
            scroll_offset: 0,
            width,
            visible_rows,
            max_lines,
        }
    }

    /// All complete lines, oldest first.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of complete lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether there are no complete lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether unterminated output is waiting in the accumulator.
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Append one engine-generated line, truncated to the display width.
    pub fn push_line(&mut self, line: &str) {
        self.lines.push(text::truncate(line, self.width));
        self.enforce_cap();
    }

    /// Append `line` wrapped into as many display lines as it needs.
    pub fn push_wrapped(&mut self, line: &str) {
        self.lines.extend(text::wrap(line, self.width));
        self.enforce_cap();
    }

    /// Feed raw output bytes; complete segments become lines.
    pub fn push_output(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);

        while let Some(pos) = self
            .partial
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        {
            let segment: Vec<u8> = self.partial.drain(..=pos).collect();
            self.push_segment(&segment[..pos]);
        }
    }

    /// Emit whatever is left in the accumulator as a final line.
    pub fn flush_partial(&mut self) {
        if self.partial.is_empty() {
            return;
        }
        let segment = std::mem::take(&mut self.partial);
        self.push_segment(&segment);
    }

    fn push_segment(&mut self, segment: &[u8]) {
        let decoded = String::from_utf8_lossy(segment);
        let trimmed = decoded.trim();
        if !trimmed.is_empty() {
            self.push_wrapped(trimmed);
        }
    }

    /// Drop every line and reset scrolling.
    ///
    /// The accumulator is kept: it belongs to a command that may still be
    /// running.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll_offset = 0;
    }

    /// Lines scrolled back from the tail.
    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    fn max_scroll(&self) -> usize {
        self.lines.len().saturating_sub(self.visible_rows)
    }

    /// Scroll one line towards older output.
    pub fn scroll_up(&mut self) {
        self.scroll_offset = (self.scroll_offset + 1).min(self.max_scroll());
    }

    /// Scroll one line towards newer output.
    pub fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
    }

    /// Jump back to the tail.
    pub fn reset_scroll(&mut self) {
        self.scroll_offset = 0;
    }

    /// Up to `max_rows` lines ending `scroll_offset` lines before the tail.
    pub fn visible(&self, max_rows: usize) -> Vec<String> {
        let end = self.lines.len() - self.scroll_offset.min(self.lines.len());
        let start = end.saturating_sub(max_rows);
        self.lines[start..end].to_vec()
    }

    fn enforce_cap(&mut self) {
        if self.max_lines > 0 && self.lines.len() > self.max_lines {
            let excess = self.lines.len() - self.max_lines;
            self.lines.drain(..excess);
        }
        self.scroll_offset = self.scroll_offset.min(self.max_scroll());
    }
}
