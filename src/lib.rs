//! # log_express
//!
//! A small users HTTP service built around a structured request-logging
//! pipeline.
//!
//! ## Features
//!
//! - **Structured logger**: winston-style levels, per-sink thresholds,
//!   default metadata, asynchronous delivery with isolated sinks
//! - **Sinks**: console, daily rotating files with gzip archives and
//!   retention, and an Elasticsearch-compatible bulk sink
//! - **HTTP pipeline**: correlation ids, one access record per request and
//!   an error boundary that logs failures with their correlation id
//! - **Configuration**: layered defaults, TOML file and environment

pub mod appenders;
pub mod config;
pub mod core;
pub mod http;
pub mod macros;
pub mod users;

pub mod prelude {
    pub use crate::appenders::{
        ConsoleAppender, DailyRotateFileAppender, DailyRotatePolicy, SearchIndexAppender,
        SearchIndexConfig,
    };
    pub use crate::core::{
        stderr_reporter, Appender, Delivery, DeliveryReport, EventCallback, FieldValue,
        LogContext, LogEntry, LogLevel, Logger, LoggerBuilder, LoggerContext, LoggerError,
        LoggerMetrics, OutputFormat, Result, SinkEvent, TimestampFormat, DEFAULT_SHUTDOWN_TIMEOUT,
    };
}

pub use appenders::{ConsoleAppender, DailyRotateFileAppender, SearchIndexAppender};
pub use config::{AppConfig, LoggingConfig};
pub use core::{
    stderr_reporter, Appender, Delivery, DeliveryReport, EventCallback, EventObservers,
    FieldValue, LogContext, LogEntry, LogLevel, Logger, LoggerBuilder, LoggerContext, LoggerError,
    LoggerMetrics, OutputFormat, Result, SinkEvent, TimestampFormat, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use http::{build_router, AppError, AppState, CorrelationId};
pub use users::UserService;
