//! Process-wide logger for the `log` facade
//!
//! The engine only uses the standard `log` macros. Embedding applications
//! either install their own logger or call [`init_logging`] once with the
//! `[logging]` configuration section.
//!
//! ```no_run
//! use fanpoll_core::config::LoggingConfig;
//!
//! fanpoll_core::logging::init_logging(&LoggingConfig::default())?;
//! log::info!("Sweeper started");
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod formatter;

pub use formatter::{LogEntry, LogFormat, LogLevel};

use crate::config::LoggingConfig;
use anyhow::anyhow;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Install the logger. Safe to call multiple times; only the first call
/// takes effect.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = LogLevel::parse(&config.level)
        .ok_or_else(|| anyhow!("Invalid log level: {}", config.level))?;
    let format = LogFormat::parse(&config.format)
        .ok_or_else(|| anyhow!("Invalid log format: {}", config.format))?;

    let mut result = Ok(());
    INIT.call_once(|| {
        let logger = FanpollLogger { level, format, stderr: config.stderr };
        result = log::set_boxed_logger(Box::new(logger))
            .map(|()| log::set_max_level(level.to_filter()))
            .map_err(|e| anyhow!("Logger already installed: {}", e));
    });
    result
}

struct FanpollLogger {
    level: LogLevel,
    format: LogFormat,
    stderr: bool,
}

impl log::Log for FanpollLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level.to_filter()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.format.format_entry(&LogEntry::from_record(record));
        if self.stderr {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        } else {
            let _ = writeln!(std::io::stdout().lock(), "{}", line);
        }
    }

    fn flush(&self) {
        if self.stderr {
            let _ = std::io::stderr().flush();
        } else {
            let _ = std::io::stdout().flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_rejected_before_install() {
        let config = LoggingConfig { level: "loud".into(), ..Default::default() };
        assert!(init_logging(&config).is_err());
    }
}
