//! Router tests: correlation ids, access records and the error boundary

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use log_express::http::{with_pipeline, AppError, CORRELATION_HEADER};
use log_express::prelude::*;
use log_express::{build_router, AppState, UserService};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for .oneshot()

struct MemoryAppender(Arc<Mutex<Vec<LogEntry>>>);

impl Appender for MemoryAppender {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        self.0.lock().push(entry.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Silly
    }
}

struct Harness {
    app: Router,
    records: Arc<Mutex<Vec<LogEntry>>>,
    users: Arc<UserService>,
}

impl Harness {
    fn new() -> Self {
        let records = Arc::new(Mutex::new(Vec::new()));
        let logger = Arc::new(
            Logger::builder()
                .appender(MemoryAppender(Arc::clone(&records)))
                .build(),
        );
        let state = AppState::new(logger, UserService::seeded());
        let users = Arc::clone(&state.users);

        Self {
            app: build_router(state),
            records,
            users,
        }
    }

    fn at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.records
            .lock()
            .iter()
            .filter(|entry| entry.level == level)
            .cloned()
            .collect()
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_users(body: &'static str) -> Request<Body> {
    Request::builder()
        .uri("/api/users")
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn list_users_gets_correlation_header_and_one_access_record() {
    let harness = Harness::new();

    let request = Request::builder()
        .uri("/api/users")
        .body(Body::empty())
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let correlation_id = response
        .headers()
        .get(CORRELATION_HEADER)
        .expect("response should carry a correlation id")
        .to_str()
        .unwrap()
        .to_string();
    assert!(uuid::Uuid::parse_str(&correlation_id).is_ok());

    let body = body_json(response).await;
    assert_eq!(body["message"], "Users fetched successfully");
    assert_eq!(body["users"].as_array().unwrap().len(), 3);
    assert!(body["users"][0].get("password").is_none());

    let access = harness.at(LogLevel::Http);
    assert_eq!(access.len(), 1);
    assert!(access[0].message.starts_with("HTTP GET /api/users 200 "));
    assert!(access[0].message.ends_with("ms"));
    assert_eq!(access[0].correlation_id.as_deref(), Some(correlation_id.as_str()));
    assert!(harness.at(LogLevel::Error).is_empty());
}

#[tokio::test]
async fn inbound_correlation_id_is_preserved() {
    let harness = Harness::new();

    let request = Request::builder()
        .uri("/")
        .header("x-correlation-id", "client-supplied-7")
        .body(Body::empty())
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(CORRELATION_HEADER).unwrap(), "client-supplied-7");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Hello all");

    let access = harness.at(LogLevel::Http);
    assert_eq!(access[0].correlation_id.as_deref(), Some("client-supplied-7"));
}

#[tokio::test]
async fn create_user_with_missing_fields_is_rejected_and_logged_once() {
    let harness = Harness::new();

    let response = harness.app.clone().oneshot(post_users("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let correlation_id = response
        .headers()
        .get(CORRELATION_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let body = body_json(response).await;
    assert_eq!(body, json!({ "message": "Name, email and password are required" }));
    assert_eq!(harness.users.len(), 3);

    let errors = harness.at(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Name, email and password are required");
    assert_eq!(errors[0].correlation_id.as_deref(), Some(correlation_id.as_str()));
    assert_eq!(
        errors[0].field("status_code").map(ToString::to_string),
        Some("400".to_string())
    );
    assert!(errors[0].field("stack").is_some());

    let access = harness.at(LogLevel::Http);
    assert_eq!(access.len(), 1);
    assert!(access[0].message.starts_with("HTTP POST /api/users 400 "));
}

#[tokio::test]
async fn malformed_json_is_treated_as_empty_body() {
    let harness = Harness::new();

    let response = harness.app.clone().oneshot(post_users("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.users.len(), 3);
}

#[tokio::test]
async fn create_user_succeeds() {
    let harness = Harness::new();

    let response = harness
        .app
        .clone()
        .oneshot(post_users(
            r#"{"name":"Ada","email":"ada@example.com","password":"hunter2"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["message"], "User created successfully");
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert!(body["user"].get("password").is_none());
    assert_eq!(harness.users.len(), 4);
    assert!(harness.at(LogLevel::Error).is_empty());
}

#[tokio::test]
async fn unknown_path_is_404_behind_the_pipeline() {
    let harness = Harness::new();

    let request = Request::builder()
        .uri("/nope?x=1")
        .body(Body::empty())
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key(CORRELATION_HEADER));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Resource Not found!");

    let access = harness.at(LogLevel::Http);
    assert_eq!(access.len(), 1);
    assert!(access[0].message.starts_with("HTTP GET /nope?x=1 404 "));
    assert!(harness.at(LogLevel::Error).is_empty());
}

#[tokio::test]
async fn unsupported_method_is_logged_as_error() {
    let harness = Harness::new();

    let request = Request::builder()
        .uri("/api/users")
        .method("DELETE")
        .body(Body::empty())
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let correlation_id = response
        .headers()
        .get(CORRELATION_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let errors = harness.at(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Method Not Allowed");
    assert_eq!(errors[0].correlation_id.as_deref(), Some(correlation_id.as_str()));
    assert_eq!(
        errors[0].field("status_code").map(ToString::to_string),
        Some("405".to_string())
    );

    let access = harness.at(LogLevel::Http);
    assert_eq!(access.len(), 1);
    assert!(access[0].message.starts_with("HTTP DELETE /api/users 405 "));
}

#[tokio::test]
async fn oversized_body_is_logged_as_error() {
    let harness = Harness::new();

    // Above the default 2 MB body limit
    let request = Request::builder()
        .uri("/api/users")
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(vec![b'a'; 3 * 1024 * 1024]))
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(harness.users.len(), 3);

    let errors = harness.at(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].field("status_code").map(ToString::to_string),
        Some("413".to_string())
    );
    assert!(errors[0].correlation_id.is_some());
}

#[tokio::test]
async fn panicking_handler_becomes_generic_500() {
    let records = Arc::new(Mutex::new(Vec::new()));
    let logger = Arc::new(
        Logger::builder()
            .appender(MemoryAppender(Arc::clone(&records)))
            .build(),
    );

    async fn explode() -> &'static str {
        panic!("handler bug")
    }

    let app = with_pipeline(Router::new().route("/boom", get(explode)), logger);
    let request = Request::builder().uri("/boom").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key(CORRELATION_HEADER));
    let body = body_json(response).await;
    assert_eq!(body, json!({ "message": "Internal server error" }));

    let records = records.lock();
    let error = records
        .iter()
        .find(|entry| entry.level == LogLevel::Error)
        .expect("panic should be logged");
    assert!(error
        .field("stack")
        .and_then(|v| v.as_str())
        .is_some_and(|stack| stack.contains("handler bug")));

    let access: Vec<_> = records.iter().filter(|e| e.level == LogLevel::Http).collect();
    assert_eq!(access.len(), 1);
    assert!(access[0].message.contains(" 500 "));
}

#[tokio::test]
async fn out_of_range_status_is_coerced_to_500() {
    let records = Arc::new(Mutex::new(Vec::new()));
    let logger = Arc::new(
        Logger::builder()
            .appender(MemoryAppender(Arc::clone(&records)))
            .build(),
    );

    async fn weird() -> std::result::Result<&'static str, AppError> {
        Err(AppError::new(StatusCode::OK, "not really an error"))
    }

    let app = with_pipeline(Router::new().route("/weird", get(weird)), logger);
    let request = Request::builder().uri("/weird").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        records
            .lock()
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .count(),
        1
    );
}

#[tokio::test]
async fn dropped_request_still_gets_an_access_record() {
    let records = Arc::new(Mutex::new(Vec::new()));
    let logger = Arc::new(
        Logger::builder()
            .appender(MemoryAppender(Arc::clone(&records)))
            .build(),
    );

    async fn hang() -> &'static str {
        std::future::pending::<()>().await;
        "unreachable"
    }

    let app = with_pipeline(Router::new().route("/slow", get(hang)), logger);
    let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();

    // The timeout drops the in-flight request future
    let outcome = tokio::time::timeout(Duration::from_millis(20), app.oneshot(request)).await;
    assert!(outcome.is_err());

    let records = records.lock();
    let access: Vec<_> = records.iter().filter(|e| e.level == LogLevel::Http).collect();
    assert_eq!(access.len(), 1);
    assert!(access[0].message.starts_with("HTTP GET /slow 0 "));
    assert!(access[0].message.ends_with("(aborted)"));
    assert_eq!(
        access[0].field("status_code").map(ToString::to_string),
        Some("0".to_string())
    );
    assert_eq!(
        access[0].field("aborted").map(ToString::to_string),
        Some("true".to_string())
    );
    assert!(access[0].correlation_id.is_some());
    assert!(records.iter().all(|e| e.level != LogLevel::Error));
}
