//! Human-readable session log events.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Default number of entries kept by a [`LogHistory`].
pub const DEFAULT_LOG_HISTORY: usize = 50;

/// Timestamped log line, rendered as `[HH:MM:SS] message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    timestamp: DateTime<Local>,
    message: String,
}

impl LogEvent {
    pub fn new(timestamp: DateTime<Local>, message: impl Into<String>) -> Self {
        Self { timestamp, message: message.into() }
    }

    /// Event stamped with the current local time.
    pub fn now(message: impl Into<String>) -> Self {
        Self::new(Local::now(), message)
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Bounded log history for consumers, newest entry first.
#[derive(Debug, Clone)]
pub struct LogHistory {
    entries: VecDeque<LogEvent>,
    capacity: usize,
}

impl LogHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    /// Record an event, evicting the oldest once full.
    pub fn push(&mut self, event: LogEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(event);
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &LogEvent> {
        self.entries.iter()
    }

    /// Rendered lines from newest to oldest.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogHistory {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_HISTORY)
    }
}
