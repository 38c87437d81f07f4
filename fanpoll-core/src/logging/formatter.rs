//! Log levels, entries and output formats

use chrono::{DateTime, Utc};

/// Severity threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// How logs should be formatted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// {"timestamp":"2024-01-15T10:30:00Z","level":"INFO","target":"fanpoll_core::ledger","message":"..."}
    Json,
    /// 2024-01-15 10:30:00.000 INFO  [fanpoll_core::ledger] ...
    Human,
    /// timestamp=2024-01-15T10:30:00Z level=INFO target=fanpoll_core::ledger message="..."
    Logfmt,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "human" | "text" => Some(LogFormat::Human),
            "logfmt" => Some(LogFormat::Logfmt),
            _ => None,
        }
    }

    pub fn format_entry(&self, entry: &LogEntry) -> String {
        match self {
            LogFormat::Json => format_json(entry),
            LogFormat::Human => format_human(entry),
            LogFormat::Logfmt => format_logfmt(entry),
        }
    }
}

/// A rendered-agnostic log line
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: log::Level,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: log::Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self { timestamp: Utc::now(), level, target: target.into(), message: message.into() }
    }

    pub fn from_record(record: &log::Record) -> Self {
        Self::new(record.level(), record.target(), record.args().to_string())
    }
}

fn format_json(entry: &LogEntry) -> String {
    let json = serde_json::json!({
        "timestamp": entry.timestamp.to_rfc3339(),
        "level": entry.level.as_str(),
        "target": entry.target,
        "message": entry.message,
    });
    json.to_string()
}

fn format_human(entry: &LogEntry) -> String {
    format!(
        "{} {:5} [{}] {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        entry.level.as_str(),
        entry.target,
        entry.message
    )
}

fn format_logfmt(entry: &LogEntry) -> String {
    format!(
        "timestamp={} level={} target={} message=\"{}\"",
        entry.timestamp.to_rfc3339(),
        entry.level.as_str(),
        entry.target,
        entry.message.replace('"', "\\\"")
    )
}
