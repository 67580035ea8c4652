//! Correlation id middleware
//!
//! Every request leaves this layer with exactly one `x-correlation-id`
//! header. A usable inbound value is kept; otherwise a UUID v4 is minted.
//! The same value is echoed on the response.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::convert::Infallible;
use std::fmt;

pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Correlation id of the current request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ensure `headers` carries a usable correlation id and return it
///
/// Absent, empty, non-visible-ASCII or repeated values are replaced.
/// Calling it twice returns the same id.
pub fn assign_correlation_id(headers: &mut HeaderMap) -> CorrelationId {
    let mut values = headers.get_all(&CORRELATION_HEADER).iter();
    let existing = match (values.next(), values.next()) {
        (Some(value), None) => usable(value),
        _ => None,
    };

    if let Some(id) = existing {
        return CorrelationId(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&id) {
        headers.insert(CORRELATION_HEADER, value);
    }
    CorrelationId(id)
}

fn usable(value: &HeaderValue) -> Option<String> {
    let text = value.to_str().ok()?;
    let visible = !text.is_empty() && text.bytes().all(|b| b.is_ascii_graphic());
    visible.then(|| text.to_string())
}

/// Outermost layer: tag the request and echo the id on the response
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let id = assign_correlation_id(request.headers_mut());
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CorrelationId>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "correlation id layer missing"))
    }
}

/// Extractor for handlers that may run without the correlation layer
#[derive(Debug, Clone, Default)]
pub struct MaybeCorrelationId(pub Option<CorrelationId>);

impl<S> FromRequestParts<S> for MaybeCorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<CorrelationId>().cloned()))
    }
}
