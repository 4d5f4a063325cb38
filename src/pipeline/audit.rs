//! Per-run audit trail. Every entry is also forwarded to the `log` facade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Step this entry reports on; run-level entries have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunLog {
    session_id: String,
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, level: LogLevel, step: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        let mirrored: log::Level = level.into();
        match step {
            Some(step) => log::log!(mirrored, "[{}] {}: {}", self.session_id, step, message),
            None => log::log!(mirrored, "[{}] {}", self.session_id, message),
        }
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            level,
            step: step.map(str::to_string),
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Info, None, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Warn, None, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Error, None, message);
    }

    pub fn step(&mut self, step: &str, level: LogLevel, message: impl Into<String>) {
        self.record(level, Some(step), message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}
