//! Structured logger: builds one record per call and fans it out to sinks

use super::{
    appender::Appender,
    error::{LoggerError, Result},
    log_context::{FieldValue, LogContext, LoggerContext},
    log_entry::LogEntry,
    log_level::LogLevel,
    metrics::LoggerMetrics,
};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default shutdown timeout for logger cleanup (5 seconds)
///
/// Used when the logger is dropped without an explicit `shutdown()` and
/// the builder did not set one.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the async queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

const BATCH_SIZE: usize = 50;

type SinkSet = Arc<RwLock<Vec<Box<dyn Appender>>>>;

/// Outcome of delivering one record to the sink set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sinks that accepted the record
    pub delivered: usize,
    /// Sinks that returned an error or panicked
    pub failed: usize,
    /// Sinks whose threshold excluded the record
    pub filtered: usize,
}

/// Completion handle returned by [`Logger::submit`]
///
/// Dropping it is fine; the record is delivered regardless.
#[derive(Debug)]
pub struct Delivery {
    state: DeliveryState,
}

#[derive(Debug)]
enum DeliveryState {
    Ready(DeliveryReport),
    Pending(Receiver<DeliveryReport>),
    Dropped,
}

impl Delivery {
    fn ready(report: DeliveryReport) -> Self {
        Self {
            state: DeliveryState::Ready(report),
        }
    }

    fn pending(receiver: Receiver<DeliveryReport>) -> Self {
        Self {
            state: DeliveryState::Pending(receiver),
        }
    }

    fn dropped() -> Self {
        Self {
            state: DeliveryState::Dropped,
        }
    }

    /// Wait for the record to be handed to every sink
    ///
    /// Returns `None` if the record was dropped or the timeout expired.
    pub fn wait(self, timeout: Duration) -> Option<DeliveryReport> {
        match self.state {
            DeliveryState::Ready(report) => Some(report),
            DeliveryState::Pending(receiver) => receiver.recv_timeout(timeout).ok(),
            DeliveryState::Dropped => None,
        }
    }

    /// True when the record never entered the pipeline
    pub fn is_dropped(&self) -> bool {
        matches!(self.state, DeliveryState::Dropped)
    }
}

enum Envelope {
    Record {
        entry: LogEntry,
        ack: Option<Sender<DeliveryReport>>,
    },
    Barrier(Sender<()>),
}

/// Process-wide structured logger
///
/// Shared as `Arc<Logger>`; every method takes `&self`. Logging never
/// returns an error: sink failures are isolated, counted and reported on
/// stderr.
pub struct Logger {
    appenders: SinkSet,
    defaults: LoggerContext,
    /// Rank of the least severe threshold among the sinks
    max_rank: AtomicU8,
    sender: RwLock<Option<Sender<Envelope>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    metrics: Arc<LoggerMetrics>,
    closed: AtomicBool,
    shutdown_timeout: Duration,
}

impl Logger {
    /// Synchronous logger: sinks are called on the logging thread
    #[must_use]
    pub fn new() -> Self {
        Self {
            appenders: Arc::new(RwLock::new(Vec::new())),
            defaults: LoggerContext::new(),
            max_rank: AtomicU8::new(0),
            sender: RwLock::new(None),
            worker: Mutex::new(None),
            metrics: Arc::new(LoggerMetrics::new()),
            closed: AtomicBool::new(false),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Asynchronous logger: a worker thread drains a bounded queue
    #[must_use]
    pub fn with_async(capacity: usize) -> Self {
        let logger = Self::new();
        let (sender, receiver) = bounded(capacity.max(1));
        let appenders = Arc::clone(&logger.appenders);
        let metrics = Arc::clone(&logger.metrics);

        let spawned = thread::Builder::new()
            .name("log-express-worker".to_string())
            .spawn(move || Self::run_worker(&receiver, &appenders, &metrics));

        match spawned {
            Ok(handle) => {
                *logger.sender.write() = Some(sender);
                *logger.worker.lock() = Some(handle);
            }
            Err(e) => {
                eprintln!(
                    "[LOGGER ERROR] Failed to spawn log worker thread: {}. Falling back to synchronous logging.",
                    e
                );
            }
        }

        logger
    }

    fn run_worker(
        receiver: &Receiver<Envelope>,
        appenders: &SinkSet,
        metrics: &Arc<LoggerMetrics>,
    ) {
        let mut batch = Vec::with_capacity(BATCH_SIZE);

        // recv() fails once every sender is gone and the queue is empty
        while let Ok(first) = receiver.recv() {
            batch.push(first);
            while batch.len() < BATCH_SIZE {
                match receiver.try_recv() {
                    Ok(envelope) => batch.push(envelope),
                    Err(_) => break,
                }
            }

            let mut guard = appenders.write();
            for envelope in batch.drain(..) {
                match envelope {
                    Envelope::Record { entry, ack } => {
                        let report = Self::dispatch(&mut guard, &entry, metrics);
                        if let Some(ack) = ack {
                            let _ = ack.send(report);
                        }
                    }
                    Envelope::Barrier(done) => {
                        Self::flush_all(&mut guard);
                        let _ = done.send(());
                    }
                }
            }
            Self::flush_all(&mut guard);
        }
    }

    /// Hand one record to every sink whose threshold admits it
    ///
    /// Each sink call is isolated with `catch_unwind`, so a failing or
    /// panicking sink does not stop the others.
    fn dispatch(
        appenders: &mut [Box<dyn Appender>],
        entry: &LogEntry,
        metrics: &LoggerMetrics,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for appender in appenders.iter_mut() {
            if !entry.level.is_enabled_for(appender.min_level()) {
                report.filtered += 1;
                continue;
            }

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                appender.append(entry)
            }));

            match result {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    eprintln!("[LOGGER ERROR] Appender '{}' failed: {}", appender.name(), e);
                    metrics.record_sink_failure();
                    report.failed += 1;
                }
                Err(payload) => {
                    eprintln!(
                        "[LOGGER CRITICAL] Appender '{}' panicked: {}. \
                         Other appenders continue to function.",
                        appender.name(),
                        panic_message(payload.as_ref())
                    );
                    metrics.record_sink_failure();
                    report.failed += 1;
                }
            }
        }

        if report.delivered > 0 {
            metrics.record_delivered();
        } else if report.failed == 0 {
            metrics.record_filtered();
        }

        report
    }

    fn flush_all(appenders: &mut [Box<dyn Appender>]) {
        for appender in appenders.iter_mut() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                appender.flush()
            }));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!(
                        "[LOGGER ERROR] Appender '{}' flush failed: {}",
                        appender.name(),
                        e
                    );
                }
                Err(payload) => {
                    eprintln!(
                        "[LOGGER CRITICAL] Appender '{}' panicked during flush: {}",
                        appender.name(),
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
    }

    pub fn add_appender(&self, appender: Box<dyn Appender>) {
        let rank = appender.min_level().rank();
        self.appenders.write().push(appender);
        self.max_rank.fetch_max(rank, Ordering::Relaxed);
    }

    /// Number of registered sinks
    pub fn appender_count(&self) -> usize {
        self.appenders.read().len()
    }

    /// Default metadata merged into every record
    pub fn defaults(&self) -> &LoggerContext {
        &self.defaults
    }

    /// Whether any sink would accept a record at `level`
    pub fn enabled(&self, level: LogLevel) -> bool {
        level.rank() <= self.max_rank.load(Ordering::Relaxed) && self.appender_count() > 0
    }

    /// Submit a record and get a handle to its completion
    ///
    /// Never blocks on sink I/O in async mode.
    pub fn submit(&self, entry: LogEntry) -> Delivery {
        self.send_entry(entry, true)
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        if !self.enabled(level) {
            self.metrics.record_filtered();
            return;
        }
        self.send_entry(LogEntry::new(level, message), false);
    }

    /// Log with structured metadata fields
    pub fn log_with_context(&self, level: LogLevel, message: impl AsRef<str>, context: LogContext) {
        if !self.enabled(level) {
            self.metrics.record_filtered();
            return;
        }
        self.send_entry(LogEntry::new(level, message).with_context(context), false);
    }

    /// Log a fully built record (fire-and-forget)
    pub fn log_entry(&self, entry: LogEntry) {
        if !self.enabled(entry.level) {
            self.metrics.record_filtered();
            return;
        }
        self.send_entry(entry, false);
    }

    fn send_entry(&self, mut entry: LogEntry, want_ack: bool) -> Delivery {
        if self.closed.load(Ordering::Acquire) {
            self.metrics.record_dropped();
            return Delivery::dropped();
        }

        if !self.defaults.is_empty() {
            let mut context = entry.context.take().unwrap_or_default();
            self.defaults.merge_into(&mut context);
            entry.context = Some(context);
        }

        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            let mut appenders = self.appenders.write();
            return Delivery::ready(Self::dispatch(&mut appenders, &entry, &self.metrics));
        };

        let (ack, delivery) = if want_ack {
            let (tx, rx) = bounded(1);
            (Some(tx), Delivery::pending(rx))
        } else {
            (None, Delivery::dropped())
        };

        match sender.try_send(Envelope::Record { entry, ack }) {
            Ok(()) => delivery,
            Err(TrySendError::Full(Envelope::Record { entry, .. })) => self.handle_overflow(entry),
            Err(_) => {
                self.metrics.record_dropped();
                Delivery::dropped()
            }
        }
    }

    /// Queue full: error records are written on the caller, the rest dropped
    fn handle_overflow(&self, entry: LogEntry) -> Delivery {
        self.metrics.record_queue_full();

        if entry.level == LogLevel::Error {
            let mut appenders = self.appenders.write();
            return Delivery::ready(Self::dispatch(&mut appenders, &entry, &self.metrics));
        }

        let dropped_before = self.metrics.record_dropped();
        if dropped_before == 0 || (dropped_before + 1) % 1000 == 0 {
            eprintln!(
                "[LOGGER WARNING] Queue full, {} logs dropped. \
                 Consider increasing the queue capacity.",
                dropped_before + 1
            );
        }
        Delivery::dropped()
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }

    pub fn dropped_count(&self) -> u64 {
        self.metrics.dropped_count()
    }

    /// Write out everything submitted so far
    ///
    /// In async mode this waits (bounded by [`DEFAULT_SHUTDOWN_TIMEOUT`]) for
    /// the worker to reach a barrier placed after the pending records.
    pub fn flush(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LoggerError::LoggerStopped);
        }

        let sender = self.sender.read().clone();
        match sender {
            Some(sender) => {
                let (done_tx, done_rx) = bounded(1);
                sender
                    .send_timeout(Envelope::Barrier(done_tx), DEFAULT_SHUTDOWN_TIMEOUT)
                    .map_err(|_| LoggerError::sink("log queue did not accept flush barrier"))?;
                done_rx
                    .recv_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
                    .map_err(|_| LoggerError::sink("timed out waiting for log worker flush"))
            }
            None => {
                Self::flush_all(&mut self.appenders.write());
                Ok(())
            }
        }
    }

    /// Drain the queue, stop the worker and close every sink
    ///
    /// Idempotent. Returns `true` when everything finished within `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return true;
        }

        // Closing the channel lets the worker drain and exit
        drop(self.sender.write().take());

        let mut clean = true;
        if let Some(handle) = self.worker.lock().take() {
            let start = Instant::now();
            loop {
                if handle.is_finished() {
                    if let Err(e) = handle.join() {
                        eprintln!(
                            "[LOGGER ERROR] Log worker thread panicked during shutdown: {}",
                            panic_message(e.as_ref())
                        );
                        clean = false;
                    }
                    break;
                }
                if start.elapsed() >= timeout {
                    eprintln!(
                        "[LOGGER WARNING] Log worker did not finish within {:?}. \
                         Some logs may be lost.",
                        timeout
                    );
                    return false;
                }
                thread::sleep(Duration::from_millis(10));
            }
        }

        let mut appenders = self.appenders.write();
        for appender in appenders.iter_mut() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                appender.close()
            }));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("[LOGGER ERROR] Failed to close '{}': {}", appender.name(), e);
                    clean = false;
                }
                Err(payload) => {
                    eprintln!(
                        "[LOGGER CRITICAL] Appender '{}' panicked during close: {}",
                        appender.name(),
                        panic_message(payload.as_ref())
                    );
                    clean = false;
                }
            }
        }

        clean
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    #[inline]
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn http(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Http, message);
    }

    #[inline]
    pub fn verbose(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Verbose, message);
    }

    #[inline]
    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn silly(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Silly, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown(self.shutdown_timeout);

        let dropped = self.metrics.dropped_count();
        if dropped > 0 {
            eprintln!(
                "[LOGGER WARNING] Logger shutting down with {} dropped logs (drop rate: {:.2}%)",
                dropped,
                self.metrics.drop_rate()
            );
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Builder for constructing a Logger
///
/// # Example
/// ```
/// use log_express::prelude::*;
///
/// let logger = Logger::builder()
///     .appender(ConsoleAppender::new().with_min_level(LogLevel::Http))
///     .default_field("service", "users-api")
///     .async_mode(1000)
///     .build();
/// logger.info("ready");
/// ```
pub struct LoggerBuilder {
    appenders: Vec<Box<dyn Appender>>,
    defaults: Vec<(String, FieldValue)>,
    async_capacity: Option<usize>,
    shutdown_timeout: Duration,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        Self {
            appenders: Vec::new(),
            defaults: Vec::new(),
            async_capacity: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn appender<A: Appender + 'static>(mut self, appender: A) -> Self {
        self.appenders.push(Box::new(appender));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn boxed_appender(mut self, appender: Box<dyn Appender>) -> Self {
        self.appenders.push(appender);
        self
    }

    /// Add a default metadata field to every record
    #[must_use = "builder methods return a new value"]
    pub fn default_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    /// Enable async mode with the given queue capacity
    ///
    /// If not called, the logger is synchronous.
    #[must_use = "builder methods return a new value"]
    pub fn async_mode(mut self, capacity: usize) -> Self {
        self.async_capacity = Some(capacity);
        self
    }

    /// Timeout used when the logger is dropped
    #[must_use = "builder methods return a new value"]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> Logger {
        let mut logger = match self.async_capacity {
            Some(capacity) => Logger::with_async(capacity),
            None => Logger::new(),
        };
        logger.shutdown_timeout = self.shutdown_timeout;

        for (key, value) in self.defaults {
            logger.defaults.set(key, value);
        }
        for appender in self.appenders {
            logger.add_appender(appender);
        }

        logger
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    #[must_use]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }
}
