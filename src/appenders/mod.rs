//! Appender implementations

pub mod console;
pub mod daily_rotate;
pub mod search_index;

pub use console::ConsoleAppender;
pub use daily_rotate::{DailyRotateFileAppender, DailyRotatePolicy};
pub use search_index::{
    BulkResponse, BulkTransport, HttpTransport, SearchIndexAppender, SearchIndexConfig,
};

pub use crate::core::Appender;
