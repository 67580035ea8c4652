use anyhow::Context;
use log_express::prelude::*;
use log_express::{build_router, AppConfig, AppState, UserService};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    let logger = Arc::new(
        config
            .logging
            .build_logger()
            .context("failed to initialise logging")?,
    );

    let app = build_router(AppState::new(Arc::clone(&logger), UserService::seeded()));

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}:{}", config.server.host, config.server.port))?;
    let addr = listener.local_addr().context("listener has no local address")?;

    logger.log_with_context(
        LogLevel::Info,
        format!("Server is running on port {}", addr.port()),
        LogContext::new()
            .with_field("host", config.server.host.as_str())
            .with_field("port", addr.port()),
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(ref e) = served {
        logger.error(format!("Server error: {}", e));
    }
    logger.info("Server stopped");

    if !logger.shutdown(DEFAULT_SHUTDOWN_TIMEOUT) {
        eprintln!("[LOGGER WARNING] Logger did not shut down cleanly");
    }

    served.context("server terminated with an error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
