//! Basic logger usage example
//!
//! Demonstrates per-sink thresholds on the console and structured metadata.
//!
//! Run with: cargo run --example basic_usage

use log_express::prelude::*;
use log_express::{http, info};

fn main() -> Result<()> {
    println!("=== log_express - Basic Usage Example ===\n");

    let logger = Logger::builder()
        .appender(
            ConsoleAppender::new()
                .with_min_level(LogLevel::Silly)
                .with_output_format(OutputFormat::Text)
                .with_colors(true),
        )
        .default_field("service", "basic-usage")
        .build();

    println!("1. Logging at every level:");
    for level in LogLevel::ALL {
        logger.log(level, format!("This is a {} message", level));
    }

    println!("\n2. Structured metadata and macros:");
    logger.log_with_context(
        LogLevel::Info,
        "User created",
        LogContext::new()
            .with_field("user_id", 4i64)
            .with_field("email", "ada@example.com"),
    );
    info!(logger, "Server is running on port {}", 3000);
    http!(logger, "HTTP {} {} {} {}ms", "GET", "/api/users", 200, 2);

    println!("\n3. A console sink that only shows http and above:");
    let quiet = Logger::builder()
        .appender(ConsoleAppender::new().with_output_format(OutputFormat::Json))
        .build();
    quiet.debug("Debug message (hidden)");
    quiet.http("HTTP GET / 200 1ms");
    quiet.warn("Warning message (visible)");

    logger.flush()?;
    println!("\n=== Example completed successfully! ===");

    Ok(())
}
