//! Appender trait for log output destinations (sinks)

use super::{error::Result, log_entry::LogEntry, log_level::LogLevel};

pub trait Appender: Send + Sync {
    fn append(&mut self, entry: &LogEntry) -> Result<()>;
    fn flush(&mut self) -> Result<()>;

    /// Release resources at shutdown
    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    fn name(&self) -> &str;

    /// Least severe level this sink accepts
    fn min_level(&self) -> LogLevel;
}
