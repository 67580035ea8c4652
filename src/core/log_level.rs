//! Log level definitions
//!
//! Levels are ranked from most to least severe. A record is enabled for a
//! threshold when its rank is at or below the threshold's rank.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    #[default]
    Info = 2,
    Http = 3,
    Verbose = 4,
    Debug = 5,
    Silly = 6,
}

impl LogLevel {
    /// All levels, most severe first
    pub const ALL: [LogLevel; 7] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Http,
        LogLevel::Verbose,
        LogLevel::Debug,
        LogLevel::Silly,
    ];

    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Http => "http",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
            LogLevel::Silly => "silly",
        }
    }

    /// Numeric rank, 0 being the most severe
    #[inline]
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Whether a record at this level passes a sink configured with `threshold`
    #[inline]
    pub fn is_enabled_for(&self, threshold: LogLevel) -> bool {
        self.rank() <= threshold.rank()
    }

    pub fn color_code(&self) -> colored::Color {
        use colored::Color::*;
        match self {
            LogLevel::Error => Red,
            LogLevel::Warn => Yellow,
            LogLevel::Info => Green,
            LogLevel::Http => Magenta,
            LogLevel::Verbose => Cyan,
            LogLevel::Debug => Blue,
            LogLevel::Silly => BrightBlack,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "http" => Ok(LogLevel::Http),
            "verbose" => Ok(LogLevel::Verbose),
            "debug" => Ok(LogLevel::Debug),
            "silly" => Ok(LogLevel::Silly),
            _ => Err(format!("Invalid log level: '{}'", s)),
        }
    }
}
