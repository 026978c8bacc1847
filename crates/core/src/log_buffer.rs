//! Fixed-capacity FIFO of log lines.

use std::collections::VecDeque;

/// Most recent log lines retained per job.
pub const LOG_CAPACITY: usize = 400;

/// Ordered, bounded log tail.
///
/// Appending beyond capacity evicts the oldest line. Lines are never
/// reordered or deduplicated.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    /// Lines pushed since creation or the last clear, evicted ones included.
    appended: u64,
}

impl LogBuffer {
    /// Empty buffer holding up to [`LOG_CAPACITY`] lines.
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    /// A buffer holding at most `capacity` lines (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            appended: 0,
        }
    }

    /// Append a line, evicting the oldest one when full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
        self.appended += 1;
    }

    /// Drop every line and restart the append count.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.appended = 0;
    }

    /// Total lines pushed since the last clear, including evicted ones.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines kept before the oldest is evicted.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained lines, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Copy of the retained lines, oldest first.
    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}
