//! Ring-buffer debug log
//!
//! Keeps the last few log lines in memory and mirrors them into a rendered
//! display string broadcast over a watch channel, so a consumer can show a
//! small rolling debug readout without scraping the tracing output. Every
//! entry is also forwarded to the matching `tracing` macro.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Number of lines the debug display retains by default.
pub const DEFAULT_CAPACITY: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Local>,
    pub message: String,
}

/// Bounded in-memory log with a subscribable rendered display.
#[derive(Debug)]
pub struct DebugLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
    display: watch::Sender<String>,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        let (display, _) = watch::channel(String::new());
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
            display,
        }
    }

    /// Receiver for the rendered display, updated on every append.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.display.subscribe()
    }

    /// Retained lines joined with newlines, oldest first.
    pub fn display(&self) -> String {
        self.display.borrow().clone()
    }

    /// Snapshot of the retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.record(LogLevel::Debug, message.to_string());
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.record(LogLevel::Info, message.to_string());
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.record(LogLevel::Warn, message.to_string());
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.record(LogLevel::Error, message.to_string());
    }

    fn record(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }

        let rendered = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.push_back(LogEntry {
                level,
                timestamp: Local::now(),
                message,
            });
            while entries.len() > self.capacity {
                entries.pop_front();
            }
            entries
                .iter()
                .map(|entry| entry.message.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        };
        self.display.send_replace(rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entries_are_evicted_past_capacity() {
        let log = DebugLog::new(DEFAULT_CAPACITY);
        for n in 0..6 {
            log.info(format!("line {}", n));
        }

        let entries = log.entries();
        assert_eq!(entries.len(), DEFAULT_CAPACITY);
        assert_eq!(entries[0].message, "line 2");
        assert_eq!(entries[3].message, "line 5");
    }

    #[test]
    fn display_joins_retained_lines() {
        let log = DebugLog::new(3);
        log.info("first");
        log.warn("second");
        assert_eq!(log.display(), "first\nsecond");

        log.error("third");
        log.debug("fourth");
        assert_eq!(log.display(), "second\nthird\nfourth");
    }

    #[test]
    fn levels_are_recorded() {
        let log = DebugLog::default();
        log.debug("a");
        log.info("b");
        log.warn("c");
        log.error("d");

        let levels: Vec<LogLevel> = log.entries().iter().map(|entry| entry.level).collect();
        assert_eq!(
            levels,
            vec![LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error]
        );
    }

    #[tokio::test]
    async fn subscribers_see_every_append() {
        let log = DebugLog::default();
        let mut display = log.subscribe();
        assert_eq!(*display.borrow_and_update(), "");

        log.info("hello");
        assert!(display.has_changed().unwrap());
        assert_eq!(*display.borrow_and_update(), "hello");

        log.info("world");
        assert_eq!(*display.borrow_and_update(), "hello\nworld");
    }

    #[test]
    fn zero_capacity_still_keeps_one_line() {
        let log = DebugLog::new(0);
        log.info("kept");
        assert_eq!(log.entries().len(), 1);
    }
}
