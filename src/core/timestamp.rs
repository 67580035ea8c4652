//! Timestamp formatting for log output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format options
///
/// # Examples
///
/// ```
/// use log_express::core::TimestampFormat;
/// use chrono::Utc;
///
/// let format = TimestampFormat::Iso8601;
/// assert!(format.format(&Utc::now()).ends_with('Z'));
///
/// // Plain "YYYY-MM-DD HH:mm:ss"
/// let format = TimestampFormat::Custom("%Y-%m-%d %H:%M:%S".to_string());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// ISO 8601 with milliseconds: `2025-01-08T10:30:45.123Z`
    #[default]
    Iso8601,

    /// RFC 3339 format: `2025-01-08T10:30:45.123456+00:00`
    Rfc3339,

    /// Unix timestamp in milliseconds: `1736332245123`
    UnixMillis,

    /// Custom strftime format
    Custom(String),
}

impl TimestampFormat {
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Iso8601 => datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            TimestampFormat::Rfc3339 => datetime.to_rfc3339(),
            TimestampFormat::UnixMillis => datetime.timestamp_millis().to_string(),
            TimestampFormat::Custom(format_str) => datetime.format(format_str).to_string(),
        }
    }

    /// JSON representation: numeric formats stay numbers
    #[must_use]
    pub fn to_json_value(&self, datetime: &DateTime<Utc>) -> serde_json::Value {
        match self {
            TimestampFormat::UnixMillis => {
                serde_json::Value::Number(datetime.timestamp_millis().into())
            }
            _ => serde_json::Value::String(self.format(datetime)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_datetime() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45)
            .single()
            .expect("valid datetime")
            + chrono::Duration::microseconds(123456)
    }

    #[test]
    fn test_iso8601_format() {
        let result = TimestampFormat::Iso8601.format(&fixed_datetime());
        assert_eq!(result, "2025-01-08T10:30:45.123Z");
    }

    #[test]
    fn test_rfc3339_format() {
        let result = TimestampFormat::Rfc3339.format(&fixed_datetime());
        assert!(result.starts_with("2025-01-08T10:30:45"));
        assert!(result.contains("+00:00"));
    }

    #[test]
    fn test_unix_millis_json_is_number() {
        let value = TimestampFormat::UnixMillis.to_json_value(&fixed_datetime());
        assert!(value.is_number());
    }

    #[test]
    fn test_custom_format() {
        let format = TimestampFormat::Custom("%Y-%m-%d %H:%M:%S".to_string());
        assert_eq!(format.format(&fixed_datetime()), "2025-01-08 10:30:45");
    }

    #[test]
    fn test_config_names() {
        let format: TimestampFormat = serde_json::from_str("\"unix_millis\"").unwrap();
        assert_eq!(format, TimestampFormat::UnixMillis);

        let format: TimestampFormat = serde_json::from_str(r#"{"custom":"%Y"}"#).unwrap();
        assert_eq!(format, TimestampFormat::Custom("%Y".to_string()));
    }
}
