//! Console appender implementation

use crate::core::output_format::format_text;
use crate::core::{Appender, LogEntry, LogLevel, OutputFormat, Result, TimestampFormat};
use colored::Colorize;

pub struct ConsoleAppender {
    min_level: LogLevel,
    use_colors: bool,
    timestamp_format: TimestampFormat,
    output_format: OutputFormat,
}

impl ConsoleAppender {
    /// JSON lines at `http` and above
    pub fn new() -> Self {
        Self {
            min_level: LogLevel::Http,
            use_colors: false,
            timestamp_format: TimestampFormat::default(),
            output_format: OutputFormat::default(),
        }
    }

    #[must_use]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Colour the level label in text output
    #[must_use]
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set the output format for this appender
    ///
    /// # Example
    ///
    /// ```
    /// use log_express::appenders::ConsoleAppender;
    /// use log_express::OutputFormat;
    ///
    /// let appender = ConsoleAppender::new()
    ///     .with_output_format(OutputFormat::Text)
    ///     .with_colors(true);
    /// ```
    #[must_use]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Render a record the way this appender prints it
    pub fn render(&self, entry: &LogEntry) -> String {
        match self.output_format {
            OutputFormat::Json => self.output_format.format(entry, &self.timestamp_format),
            OutputFormat::Text if self.use_colors => {
                let label = entry
                    .level
                    .to_str()
                    .color(entry.level.color_code())
                    .to_string();
                format_text(entry, &self.timestamp_format, &label)
            }
            OutputFormat::Text => format_text(entry, &self.timestamp_format, entry.level.to_str()),
        }
    }
}

impl Default for ConsoleAppender {
    fn default() -> Self {
        Self::new()
    }
}

impl Appender for ConsoleAppender {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let output = self.render(entry);

        // Errors go to stderr, everything else to stdout
        match entry.level {
            LogLevel::Error => eprintln!("{}", output),
            _ => println!("{}", output),
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        use std::io::Write;
        std::io::stdout().flush()?;
        std::io::stderr().flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}
