//! Bounded in-memory log
//!
//! Every component records its transitions here. Entries are kept in a
//! FIFO ring buffer (oldest evicted first) and mirrored to `tracing`, so
//! the host's subscriber decides formatting and colour.

use crate::error::LogError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use ulid::Ulid;

/// Default number of entries retained
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Ulid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Component that produced the entry
    pub source: String,
    pub message: String,
}

/// Ring-buffer logger shared by all components
#[derive(Debug)]
pub struct LogManager {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl LogManager {
    /// Create a log manager retaining at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Create a shareable log manager
    #[must_use]
    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    /// Handle that stamps every entry with `source`
    #[must_use]
    pub fn scope(self: &Arc<Self>, source: impl Into<String>) -> LogScope {
        LogScope {
            manager: Arc::clone(self),
            source: source.into(),
        }
    }

    /// Record an entry, evicting the oldest one when full
    pub fn log(&self, source: &str, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        emit(source, level, &message);

        let entry = LogEntry {
            id: Ulid::new(),
            timestamp: Utc::now(),
            level,
            source: source.to_string(),
            message,
        };

        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot of all retained entries, oldest first
    #[must_use]
    pub fn logs(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn logs_by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn logs_from(&self, source: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect()
    }

    /// The `n` most recent entries, oldest first
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Write retained entries to `path` as JSON lines
    ///
    /// # Errors
    /// Returns `LogError` if the file cannot be created or written.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<usize, LogError> {
        let snapshot = self.logs();
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        for entry in &snapshot {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(snapshot.len())
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

fn emit(source: &str, level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!(source, "{message}"),
        LogLevel::Info => tracing::info!(source, "{message}"),
        LogLevel::Success => tracing::info!(source, outcome = "success", "{message}"),
        LogLevel::Warning => tracing::warn!(source, "{message}"),
        LogLevel::Error => tracing::error!(source, "{message}"),
    }
}

/// Component-scoped view of a [`LogManager`]
#[derive(Debug, Clone)]
pub struct LogScope {
    manager: Arc<LogManager>,
    source: String,
}

impl LogScope {
    #[inline]
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.manager.log(&self.source, level, message);
    }

    #[inline]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    #[inline]
    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    #[inline]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn manager(&self) -> &Arc<LogManager> {
        &self.manager
    }
}
