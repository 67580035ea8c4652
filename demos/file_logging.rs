//! File logging example
//!
//! Writes one daily-rotating file per level, reports rotation events on
//! stderr and shuts the logger down cleanly.
//!
//! Run with: cargo run --example file_logging

use log_express::prelude::*;
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== log_express - File Logging Example ===\n");

    let policy = DailyRotatePolicy::new().with_max_size(16 * 1024);
    let mut builder = Logger::builder()
        .appender(ConsoleAppender::new().with_min_level(LogLevel::Info))
        .async_mode(1024);

    for level in [LogLevel::Error, LogLevel::Info, LogLevel::Http] {
        builder = builder.appender(
            DailyRotateFileAppender::with_policy("logs", level, policy.clone())?
                .on_event(stderr_reporter()),
        );
    }
    let logger = builder.build();

    println!("1. Logging to console and files:");
    logger.info("Application started");
    logger.debug("Loading configuration (not written anywhere)");
    logger.error("Failed to load optional plugin");

    println!("\n2. Simulating traffic:");
    for i in 1..=500 {
        logger.http(format!("HTTP GET /api/users?page={} 200 {}ms", i, i % 7));
    }

    let report = logger
        .submit(LogEntry::new(LogLevel::Info, "All operations completed"))
        .wait(Duration::from_secs(2));
    println!("   last record: {:?}", report);

    if !logger.shutdown(DEFAULT_SHUTDOWN_TIMEOUT) {
        eprintln!("logger did not shut down cleanly");
    }

    println!("\n=== Example completed successfully! ===");
    println!("Check 'logs/error', 'logs/info' and 'logs/http' for the output");

    Ok(())
}
