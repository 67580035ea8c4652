//! Output format configuration for log records
//!
//! - Json: one JSON object per line (default)
//! - Text: human-readable line, optionally coloured by the console sink

use super::log_entry::LogEntry;
use super::timestamp::TimestampFormat;
use serde::{Deserialize, Serialize};

/// Output format for log records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `{"level":"http","message":"HTTP GET /api/users 200 3ms","timestamp":"...",...}`
    #[default]
    Json,

    /// `2025-01-08T10:30:45.123Z [http] HTTP GET /api/users 200 3ms correlationId=... status_code=200`
    Text,
}

impl OutputFormat {
    pub fn format(&self, entry: &LogEntry, timestamp_format: &TimestampFormat) -> String {
        match self {
            OutputFormat::Json => format_json(entry, timestamp_format),
            OutputFormat::Text => format_text(entry, timestamp_format, entry.level.to_str()),
        }
    }
}

/// Build the JSON object for a record
///
/// Metadata fields are flattened into the top level; the fixed keys
/// (`level`, `message`, `timestamp`, `correlationId`) are never overwritten.
pub fn json_object(
    entry: &LogEntry,
    timestamp_format: &TimestampFormat,
) -> serde_json::Map<String, serde_json::Value> {
    let mut json_obj = serde_json::Map::new();

    if let Some(ref context) = entry.context {
        for (key, value) in context.fields() {
            json_obj.insert(key.clone(), value.to_json_value());
        }
    }

    json_obj.insert(
        "level".to_string(),
        serde_json::Value::String(entry.level.to_str().to_string()),
    );
    json_obj.insert(
        "message".to_string(),
        serde_json::Value::String(entry.message.clone()),
    );
    json_obj.insert(
        "timestamp".to_string(),
        timestamp_format.to_json_value(&entry.timestamp),
    );
    if let Some(ref id) = entry.correlation_id {
        json_obj.insert(
            "correlationId".to_string(),
            serde_json::Value::String(id.clone()),
        );
    }

    json_obj
}

fn format_json(entry: &LogEntry, timestamp_format: &TimestampFormat) -> String {
    serde_json::to_string(&serde_json::Value::Object(json_object(entry, timestamp_format)))
        .unwrap_or_default()
}

/// Text line with a caller-supplied level label (the console sink colours it)
pub(crate) fn format_text(
    entry: &LogEntry,
    timestamp_format: &TimestampFormat,
    level_label: &str,
) -> String {
    let mut line = format!(
        "{} [{}] {}",
        timestamp_format.format(&entry.timestamp),
        level_label,
        entry.message
    );

    if let Some(ref id) = entry.correlation_id {
        line.push_str(" correlationId=");
        line.push_str(id);
    }

    if let Some(ref context) = entry.context {
        if !context.is_empty() {
            line.push(' ');
            line.push_str(&context.format_fields());
        }
    }

    line
}
