//! Timestamped session log for operator diagnostics.
//!
//! The log is append-only for the life of one session and is cleared only
//! when a session starts or is reset, so the persisted audit trail always
//! begins with the session start. Every append is mirrored to the `log`
//! facade under the `qc_core::session` target.

use core::fmt;
use core::slice;

use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "qc_core::session";

/// Severity of a session log entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    const fn facade_level(self) -> log::Level {
        match self {
            LogLevel::Info | LogLevel::Success => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One log record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp_ms: u64,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<7} {}",
            self.timestamp_ms, self.level, self.message
        )?;
        if let Some(details) = &self.details {
            write!(f, " | {details}")?;
        }
        Ok(())
    }
}

/// Append-only session log.
pub struct SessionLog {
    entries: Vec<LogEntry>,
}

impl SessionLog {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry and mirrors it to the `log` facade.
    pub fn push(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        details: Option<String>,
        timestamp_ms: u64,
    ) {
        let entry = LogEntry {
            level,
            message: message.into(),
            details,
            timestamp_ms,
        };

        match &entry.details {
            Some(details) => log::log!(
                target: LOG_TARGET,
                level.facade_level(),
                "{} | {details}",
                entry.message
            ),
            None => log::log!(target: LOG_TARGET, level.facade_level(), "{}", entry.message),
        }

        self.entries.push(entry);
    }

    pub fn info(&mut self, message: impl Into<String>, timestamp_ms: u64) {
        self.push(LogLevel::Info, message, None, timestamp_ms);
    }

    pub fn success(&mut self, message: impl Into<String>, timestamp_ms: u64) {
        self.push(LogLevel::Success, message, None, timestamp_ms);
    }

    pub fn warning(&mut self, message: impl Into<String>, timestamp_ms: u64) {
        self.push(LogLevel::Warning, message, None, timestamp_ms);
    }

    pub fn error(&mut self, message: impl Into<String>, timestamp_ms: u64) {
        self.push(LogLevel::Error, message, None, timestamp_ms);
    }

    /// Returns an iterator over the entries in chronological order.
    pub fn oldest_first(&self) -> slice::Iter<'_, LogEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Returns the most recent entry, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Returns up to `count` of the newest entries, oldest first.
    #[must_use]
    pub fn tail(&self, count: usize) -> &[LogEntry] {
        let skip = self.entries.len().saturating_sub(count);
        &self.entries[skip..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders every entry, one per line.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Discards every entry; called only when a session starts or resets.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}
