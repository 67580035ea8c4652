//! Core logger types and traits

pub mod appender;
pub mod error;
pub mod events;
pub mod log_context;
pub mod log_entry;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod output_format;
pub mod timestamp;

pub use appender::Appender;
pub use error::{LoggerError, Result};
pub use events::{stderr_reporter, EventCallback, EventObservers, SinkEvent};
pub use log_context::{FieldValue, LogContext, LoggerContext};
pub use log_entry::LogEntry;
pub use log_level::LogLevel;
pub use logger::{
    Delivery, DeliveryReport, Logger, LoggerBuilder, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use metrics::LoggerMetrics;
pub use output_format::OutputFormat;
pub use timestamp::TimestampFormat;
