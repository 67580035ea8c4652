//! HTTP error type and the error interceptor layer
//!
//! Handlers fail with [`AppError`]. Its response carries an [`ErrorReport`]
//! in the response extensions; [`error_interceptor`] takes the report out,
//! writes one `error` record, and passes the client response through.
//! Failed responses the framework produced itself (405, 413, extractor
//! rejections) get a report built from their status.

use super::correlation::CorrelationId;
use crate::core::logger::panic_message;
use crate::core::{LogContext, LogEntry, LogLevel, Logger};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::FutureExt;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error returned by request handlers
///
/// The status is always a client or server error code; anything else is
/// coerced to 500 on construction.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    status: StatusCode,
    message: String,
    #[source]
    source: Option<BoxError>,
    stack: Option<String>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let status = if status.is_client_error() || status.is_server_error() {
            status
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let backtrace = Backtrace::capture();
        let stack = (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());

        Self {
            status,
            message: message.into(),
            source: None,
            stack,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Attach the underlying cause
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Message, cause chain and captured backtrace as one block of text
    pub fn stack(&self) -> String {
        let mut stack = format!("Error: {}", self.message);

        let mut cause = self.source.as_deref().map(|e| e as &(dyn StdError + 'static));
        while let Some(err) = cause {
            stack.push_str("\n    caused by: ");
            stack.push_str(&err.to_string());
            cause = err.source();
        }

        if let Some(ref backtrace) = self.stack {
            stack.push('\n');
            stack.push_str(backtrace);
        }
        stack
    }
}

/// What the interceptor logs for a failed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
    pub stack: String,
}

impl From<&AppError> for ErrorReport {
    fn from(err: &AppError) -> Self {
        Self {
            status: err.status,
            message: err.message.clone(),
            stack: err.stack(),
        }
    }
}

/// Marks a failure status that is a normal outcome, not an error to log
#[derive(Debug, Clone, Copy)]
pub struct NotAnError;

impl ErrorReport {
    /// Report for a failed response that carries none of its own
    fn from_status(status: StatusCode) -> Self {
        let message = status.canonical_reason().unwrap_or("Request failed").to_string();
        Self {
            status,
            stack: format!("Error: {}", message),
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = ErrorReport::from(&self);
        let body = serde_json::json!({ "message": self.message });

        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

fn generic_failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "message": INTERNAL_ERROR_MESSAGE })),
    )
        .into_response()
}

/// Build the `error` record for a report
pub fn error_entry(report: &ErrorReport, correlation_id: Option<&CorrelationId>) -> LogEntry {
    let mut context = LogContext::new()
        .with_field("status_code", report.status.as_u16())
        .with_field("stack", report.stack.as_str());

    let mut entry = LogEntry::new(LogLevel::Error, &report.message);
    if let Some(id) = correlation_id {
        context.add_field("correlation_id", id.as_str());
        entry = entry.with_correlation_id(id.as_str());
    }
    entry.with_context(context)
}

/// Innermost layer: log handler failures and turn panics into a 500
pub async fn error_interceptor(
    State(logger): State<Arc<Logger>>,
    request: Request,
    next: Next,
) -> Response {
    let correlation_id = request.extensions().get::<CorrelationId>().cloned();

    let mut response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let mut err = AppError::internal(INTERNAL_ERROR_MESSAGE);
            err.stack = Some(format!("panic: {}", panic_message(payload.as_ref())));
            err.into_response()
        }
    };

    let report = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => report,
        None => {
            let status = response.status();
            let failed = status.is_client_error() || status.is_server_error();
            if !failed || response.extensions().get::<NotAnError>().is_some() {
                return response;
            }
            ErrorReport::from_status(status)
        }
    };

    let logged = std::panic::catch_unwind(AssertUnwindSafe(|| {
        logger.log_entry(error_entry(&report, correlation_id.as_ref()));
    }));

    match logged {
        Ok(()) => response,
        Err(payload) => {
            eprintln!(
                "[LOGGER ERROR] Failed to report request error: {}",
                panic_message(payload.as_ref())
            );
            generic_failure()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_status_coercion() {
        assert_eq!(AppError::new(StatusCode::OK, "odd").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::new(StatusCode::MOVED_PERMANENTLY, "odd").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::new(StatusCode::CONFLICT, "dup").status(), StatusCode::CONFLICT);
        assert_eq!(AppError::bad_request("bad").status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_stack_includes_cause_chain() {
        let err = AppError::internal("Failed to load users")
            .with_source(io::Error::new(io::ErrorKind::NotFound, "users.json missing"));

        let stack = err.stack();
        assert!(stack.starts_with("Error: Failed to load users"));
        assert!(stack.contains("caused by: users.json missing"));
        assert!(err.source().is_some());
    }

    #[tokio::test]
    async fn test_into_response_body_and_report() {
        let response = AppError::bad_request("Name, email and password are required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let report = response.extensions().get::<ErrorReport>().cloned().unwrap();
        assert_eq!(report.status, StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "Name, email and password are required" }));
    }

    #[test]
    fn test_report_from_status() {
        let report = ErrorReport::from_status(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(report.message, "Method Not Allowed");
        assert_eq!(report.stack, "Error: Method Not Allowed");

        let odd = StatusCode::from_u16(499).unwrap();
        assert_eq!(ErrorReport::from_status(odd).message, "Request failed");
    }

    #[test]
    fn test_error_entry_metadata() {
        let report = ErrorReport {
            status: StatusCode::BAD_REQUEST,
            message: "bad".to_string(),
            stack: "Error: bad".to_string(),
        };
        let id = CorrelationId("abc".to_string());
        let entry = error_entry(&report, Some(&id));

        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.correlation_id.as_deref(), Some("abc"));
        assert_eq!(entry.field("status_code").map(ToString::to_string), Some("400".to_string()));
        assert_eq!(entry.field("correlation_id").and_then(|v| v.as_str()), Some("abc"));
    }
}
