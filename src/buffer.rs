//! Fixed-capacity window over the most recent lines of a stream.

use std::collections::VecDeque;

/// Default number of stdout lines kept for diagnosis.
pub const DEFAULT_STDOUT_LINES: usize = 30;

/// Default number of stderr lines kept for diagnosis.
pub const DEFAULT_STDERR_LINES: usize = 10;

/// A FIFO of text lines that never holds more than `capacity` entries.
///
/// Each buffer is written by a single drain task and only read once that
/// task has been joined, so no locking is done here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedLineBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl BoundedLineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the single oldest line when over capacity.
    pub fn add(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        if self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// Current lines in chronological order.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Current lines joined with newlines, for embedding in a prompt.
    pub fn joined(&self) -> String {
        self.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
