//! Criterion benchmarks for log_express

use axum::http::{HeaderMap, HeaderValue};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use log_express::appenders::search_index::{build_bulk_body, index_name};
use log_express::http::{access_entry, assign_correlation_id, RequestSummary, CORRELATION_HEADER};
use log_express::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Accepts everything and writes nowhere
struct NullAppender(LogLevel);

impl Appender for NullAppender {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        black_box(entry);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }

    fn min_level(&self) -> LogLevel {
        self.0
    }
}

fn null_logger(level: LogLevel) -> Logger {
    Logger::builder().appender(NullAppender(level)).build()
}

// ============================================================================
// Logger Creation Benchmarks
// ============================================================================

fn bench_logger_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("logger_creation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("new_sync", |b| {
        b.iter(|| {
            let logger = Logger::new();
            black_box(logger)
        });
    });

    group.bench_function("new_async", |b| {
        b.iter(|| {
            let logger = Logger::with_async(1000);
            black_box(logger)
        });
    });

    group.finish();
}

// ============================================================================
// Logging Performance Benchmarks
// ============================================================================

fn bench_sync_logging(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_logging");
    group.throughput(Throughput::Elements(1));

    let logger = null_logger(LogLevel::Silly);

    for level in [LogLevel::Error, LogLevel::Info, LogLevel::Http, LogLevel::Silly] {
        group.bench_function(level.to_str(), |b| {
            b.iter(|| {
                logger.log(level, black_box("Benchmark message"));
            });
        });
    }

    group.bench_function("with_defaults", |b| {
        let logger = Logger::builder()
            .appender(NullAppender(LogLevel::Silly))
            .default_field("service", "bench")
            .build();
        b.iter(|| {
            logger.info(black_box("Info message"));
        });
    });

    group.finish();
}

fn bench_async_logging(c: &mut Criterion) {
    let mut group = c.benchmark_group("async_logging");
    group.throughput(Throughput::Elements(1));

    let logger = Logger::builder()
        .appender(NullAppender(LogLevel::Silly))
        .async_mode(10_000)
        .build();

    group.bench_function("info", |b| {
        b.iter(|| {
            logger.info(black_box("Info message"));
        });
    });

    group.bench_function("submit_and_wait", |b| {
        b.iter(|| {
            let delivery = logger.submit(LogEntry::new(LogLevel::Http, "HTTP GET / 200 1ms"));
            black_box(delivery.wait(Duration::from_secs(1)))
        });
    });

    group.finish();
    logger.shutdown(Duration::from_secs(5));
}

// ============================================================================
// Concurrent Logging Benchmarks
// ============================================================================

fn bench_concurrent_logging(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_logging");

    let logger = Arc::new(
        Logger::builder()
            .appender(NullAppender(LogLevel::Silly))
            .async_mode(10_000)
            .build(),
    );

    group.bench_function("multi_thread_4", |b| {
        let logger = Arc::clone(&logger);
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let logger = Arc::clone(&logger);
                    std::thread::spawn(move || {
                        for _ in 0..100 {
                            logger.info(black_box("Concurrent message"));
                        }
                    })
                })
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
        });
    });

    group.finish();
    logger.shutdown(Duration::from_secs(5));
}

// ============================================================================
// Record building and formatting Benchmarks
// ============================================================================

fn bench_log_entry_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_entry_creation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("simple", |b| {
        b.iter(|| black_box(LogEntry::new(LogLevel::Info, black_box("Simple message"))));
    });

    group.bench_function("needs_sanitizing", |b| {
        b.iter(|| {
            black_box(LogEntry::new(
                LogLevel::Info,
                black_box("line one\nerror forged\tentry"),
            ))
        });
    });

    group.bench_function("access_record", |b| {
        let summary = RequestSummary {
            method: "GET".to_string(),
            url: "/api/users?page=2".to_string(),
            user_agent: Some("bench/1.0".to_string()),
            correlation_id: Some("4b1c7a0e-1f7d-4d1e-9d59-bd2b0e7a4c11".to_string()),
        };
        b.iter(|| {
            black_box(access_entry(
                &summary,
                200,
                Duration::from_millis(3),
                false,
            ))
        });
    });

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");
    group.throughput(Throughput::Elements(1));

    let entry = LogEntry::new(LogLevel::Http, "HTTP GET /api/users 200 3ms")
        .with_correlation_id("4b1c7a0e-1f7d-4d1e-9d59-bd2b0e7a4c11")
        .with_context(
            LogContext::new()
                .with_field("method", "GET")
                .with_field("status_code", 200u16)
                .with_field("response_time_ms", 3u64),
        );
    let timestamp = TimestampFormat::default();

    group.bench_function("json", |b| {
        b.iter(|| black_box(OutputFormat::Json.format(black_box(&entry), &timestamp)));
    });

    group.bench_function("text", |b| {
        b.iter(|| black_box(OutputFormat::Text.format(black_box(&entry), &timestamp)));
    });

    group.bench_function("bulk_body_100", |b| {
        let documents: Vec<(String, String)> = (0..100)
            .map(|_| {
                (
                    index_name("log-express", &entry),
                    OutputFormat::Json.format(&entry, &timestamp),
                )
            })
            .collect();
        b.iter(|| black_box(build_bulk_body(black_box(&documents))));
    });

    group.finish();
}

fn bench_level_filtering(c: &mut Criterion) {
    let mut group = c.benchmark_group("level_filtering");
    group.throughput(Throughput::Elements(1));

    let logger = null_logger(LogLevel::Info);

    group.bench_function("filtered_out", |b| {
        b.iter(|| {
            logger.debug(black_box("This should be filtered"));
        });
    });

    group.bench_function("passed_through", |b| {
        b.iter(|| {
            logger.error(black_box("This should pass"));
        });
    });

    group.finish();
}

fn bench_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlation_id");
    group.throughput(Throughput::Elements(1));

    group.bench_function("generate", |b| {
        b.iter(|| {
            let mut headers = HeaderMap::new();
            black_box(assign_correlation_id(&mut headers))
        });
    });

    group.bench_function("reuse_inbound", |b| {
        let value = HeaderValue::from_static("client-supplied-id");
        b.iter(|| {
            let mut headers = HeaderMap::new();
            headers.insert(CORRELATION_HEADER, value.clone());
            black_box(assign_correlation_id(&mut headers))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_logger_creation,
    bench_sync_logging,
    bench_async_logging,
    bench_concurrent_logging,
    bench_log_entry_creation,
    bench_serialization,
    bench_level_filtering,
    bench_correlation,
);

criterion_main!(benches);
