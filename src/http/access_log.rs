//! Access log middleware
//!
//! Writes one `http` record per request once the response is ready:
//! `HTTP GET /api/users 200 3ms`. If the request future is dropped first
//! (client gone, server shutting down) the guard still writes the record,
//! marked as aborted.

use super::correlation::CorrelationId;
use crate::core::{LogContext, LogEntry, LogLevel, Logger};
use axum::extract::{Request, State};
use axum::http::header::USER_AGENT;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Request facts captured before the handler runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub method: String,
    /// Path plus query string
    pub url: String,
    pub user_agent: Option<String>,
    pub correlation_id: Option<String>,
}

impl RequestSummary {
    pub fn from_request(request: &Request) -> Self {
        let url = request
            .uri()
            .path_and_query()
            .map_or_else(|| request.uri().path().to_string(), ToString::to_string);

        Self {
            method: request.method().to_string(),
            url,
            user_agent: request
                .headers()
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            correlation_id: request
                .extensions()
                .get::<CorrelationId>()
                .map(|id| id.as_str().to_string()),
        }
    }
}

/// Build the access record
///
/// `status` is 0 when no response was produced.
pub fn access_entry(
    summary: &RequestSummary,
    status: u16,
    elapsed: Duration,
    aborted: bool,
) -> LogEntry {
    let millis = elapsed.as_millis() as u64;
    let mut message = format!("HTTP {} {} {} {}ms", summary.method, summary.url, status, millis);
    if aborted {
        message.push_str(" (aborted)");
    }

    let mut context = LogContext::new()
        .with_field("method", summary.method.as_str())
        .with_field("url", summary.url.as_str())
        .with_field("status_code", status)
        .with_field("response_time_ms", millis);
    if let Some(ref agent) = summary.user_agent {
        context.add_field("user_agent", agent.as_str());
    }
    if aborted {
        context.add_field("aborted", true);
    }

    let mut entry = LogEntry::new(LogLevel::Http, message);
    if let Some(ref id) = summary.correlation_id {
        context.add_field("correlation_id", id.as_str());
        entry = entry.with_correlation_id(id.as_str());
    }
    entry.with_context(context)
}

/// Emits exactly one record, on completion or on drop
struct AccessGuard {
    logger: Arc<Logger>,
    summary: RequestSummary,
    started: Instant,
    done: bool,
}

impl AccessGuard {
    fn complete(mut self, status: u16) {
        self.done = true;
        self.logger
            .log_entry(access_entry(&self.summary, status, self.started.elapsed(), false));
    }
}

impl Drop for AccessGuard {
    fn drop(&mut self) {
        if !self.done {
            self.logger
                .log_entry(access_entry(&self.summary, 0, self.started.elapsed(), true));
        }
    }
}

pub async fn access_log(
    State(logger): State<Arc<Logger>>,
    request: Request,
    next: Next,
) -> Response {
    let guard = AccessGuard {
        logger,
        summary: RequestSummary::from_request(&request),
        started: Instant::now(),
        done: false,
    };

    let response = next.run(request).await;
    guard.complete(response.status().as_u16());
    response
}
