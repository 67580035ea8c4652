//! Route handlers for the users resource

use super::model::NewUser;
use super::service::UserError;
use crate::core::{LogContext, LogEntry, LogLevel};
use crate::http::{AppError, AppState, MaybeCorrelationId};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::MissingFields => AppError::bad_request(err.to_string()),
        }
    }
}

pub async fn hello() -> &'static str {
    "Hello all"
}

pub async fn list_users(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Users fetched successfully",
        "users": state.users.all(),
    }))
}

pub async fn create_user(
    State(state): State<AppState>,
    MaybeCorrelationId(correlation_id): MaybeCorrelationId,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user = state.users.create(NewUser::from_body(&body))?;

    let mut entry = LogEntry::new(LogLevel::Info, "User created")
        .with_context(LogContext::new().with_field("user_id", user.id.as_str()));
    if let Some(id) = correlation_id {
        entry = entry.with_correlation_id(id.as_str());
    }
    state.logger.log_entry(entry);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "user": user,
        })),
    ))
}
