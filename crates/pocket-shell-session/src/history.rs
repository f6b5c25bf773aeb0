//! Command history with a browse cursor.

/// Previously executed commands, most recent last.
///
/// The cursor is `None` while the user is not browsing. While browsing,
/// `Some(i)` addresses the `i`-th entry counting back from the most recent.
#[derive(Debug, Clone, Default)]
pub struct CommandHistory {
    entries: Vec<String>,
    cursor: Option<usize>,
    limit: usize,
}

impl CommandHistory {
    /// Create an empty history keeping at most `limit` entries (0 = no limit).
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            limit,
        }
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Browse position, `None` when not browsing.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Record a submitted command and stop browsing.
    pub fn push(&mut self, command: impl Into<String>) {
        self.entries.push(command.into());
        if self.limit > 0 && self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
        self.cursor = None;
    }

    /// Step towards older entries, clamping at the oldest.
    ///
    /// Returns the entry to load as input, or `None` when the history is
    /// empty and the input should stay as it is.
    pub fn back(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }

        let next = match self.cursor {
            None => 0,
            Some(i) if i + 1 < self.entries.len() => i + 1,
            Some(i) => i,
        };
        self.cursor = Some(next);
        Some(self.entry_at(next))
    }

    /// Step towards newer entries.
    ///
    /// Leaving the most recent entry ends browsing and yields empty input.
    /// Returns `None` when not browsing.
    pub fn forward(&mut self) -> Option<&str> {
        match self.cursor {
            None => None,
            Some(0) => {
                self.cursor = None;
                Some("")
            }
            Some(i) => {
                self.cursor = Some(i - 1);
                Some(self.entry_at(i - 1))
            }
        }
    }

    fn entry_at(&self, cursor: usize) -> &str {
        &self.entries[self.entries.len() - 1 - cursor]
    }
}
