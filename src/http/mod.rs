//! HTTP surface: request pipeline layers and the router

pub mod access_log;
pub mod correlation;
pub mod error;

pub use access_log::{access_entry, access_log, RequestSummary};
pub use correlation::{
    assign_correlation_id, correlation_id, CorrelationId, MaybeCorrelationId, CORRELATION_HEADER,
};
pub use error::{
    error_entry, error_interceptor, AppError, ErrorReport, NotAnError, INTERNAL_ERROR_MESSAGE,
};

use crate::core::Logger;
use crate::users::{handlers, UserService};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::{Extension, Router};
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub logger: Arc<Logger>,
    pub users: Arc<UserService>,
}

impl AppState {
    pub fn new(logger: Arc<Logger>, users: UserService) -> Self {
        Self {
            logger,
            users: Arc::new(users),
        }
    }
}

async fn not_found() -> (StatusCode, Extension<NotAnError>, &'static str) {
    (StatusCode::NOT_FOUND, Extension(NotAnError), "Resource Not found!")
}

/// Wrap `router`, outer to inner, in the correlation id, access log and
/// error interceptor layers. The fallback sits behind the same layers.
pub fn with_pipeline(router: Router, logger: Arc<Logger>) -> Router {
    router
        .layer(from_fn_with_state(Arc::clone(&logger), error_interceptor))
        .layer(from_fn_with_state(logger, access_log))
        .layer(from_fn(correlation_id))
}

pub fn build_router(state: AppState) -> Router {
    let logger = Arc::clone(&state.logger);

    let routes = Router::new()
        .route("/", get(handlers::hello))
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .fallback(not_found)
        .with_state(state);

    with_pipeline(routes, logger)
}
