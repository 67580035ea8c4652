//! Failures raised by the logger, its sinks and configuration

use std::io;

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// `operation` names what was being attempted, e.g. "archiving log file"
    #[error("{operation} failed: {message}")]
    Io {
        operation: String,
        message: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O failure: {0}")]
    Stream(#[from] io::Error),

    #[error("cannot serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The logger was shut down; nothing more is accepted
    #[error("logger has been shut down")]
    LoggerStopped,

    #[error("{component} is misconfigured: {message}")]
    Config { component: String, message: String },

    #[error("cannot write log file {path}: {message}")]
    LogFile { path: String, message: String },

    #[error("cannot rotate log file {path}: {message}")]
    Rotation { path: String, message: String },

    /// Another writer holds the exclusive lock on the active file
    #[error("log file {path} is locked by another writer")]
    Locked { path: String },

    #[error("search index {endpoint}: {message}")]
    SearchIndex { endpoint: String, message: String },

    /// A sink or the log worker could not complete a write or flush
    #[error("sink failure: {0}")]
    Sink(String),
}

impl LoggerError {
    pub fn io(operation: impl Into<String>, message: impl Into<String>, source: io::Error) -> Self {
        LoggerError::Io {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Config {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn log_file(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::LogFile {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Rotation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn locked(path: impl Into<String>) -> Self {
        LoggerError::Locked { path: path.into() }
    }

    pub fn search_index(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::SearchIndex {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn sink(message: impl Into<String>) -> Self {
        LoggerError::Sink(message.into())
    }
}
