//! Recent compute service output, kept for the diagnostics view.

use std::collections::VecDeque;
use std::sync::RwLock;

use loralab_core::LogLine;

/// Default number of lines kept.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Ring buffer of the most recent output lines, oldest first.
#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    lines: RwLock<VecDeque<LogLine>>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Add a line, evicting the oldest one at capacity.
    pub fn push(&self, line: LogLine) {
        let mut lines = self
            .lines
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// The `n` most recent lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogLine> {
        let lines = self
            .lines
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
