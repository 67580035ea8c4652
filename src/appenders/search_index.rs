//! Search-index appender
//!
//! Ships records to an Elasticsearch-compatible `_bulk` endpoint from a
//! background thread. `append` only serializes and enqueues; transport
//! problems surface as [`SinkEvent`]s, never as errors to the logger.

use crate::core::events::{EventCallback, EventObservers, SinkEvent};
use crate::core::logger::panic_message;
use crate::core::output_format::json_object;
use crate::core::{Appender, LogEntry, LogLevel, LoggerError, Result, TimestampFormat};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Connection and batching settings
#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndexConfig {
    /// Base URL of the node, e.g. `http://localhost:9200`
    pub node: String,
    /// Index name prefix; records go to `<prefix>-YYYY.MM.DD`
    pub index_prefix: String,
    pub level: LogLevel,
    pub flush_interval: Duration,
    pub batch_size: usize,
    pub queue_capacity: usize,
    /// Install the index template before the first bulk request
    pub ensure_template: bool,
    pub request_timeout: Duration,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            node: "http://localhost:9200".to_string(),
            index_prefix: "log-express".to_string(),
            level: LogLevel::Http,
            flush_interval: Duration::from_millis(2000),
            batch_size: 100,
            queue_capacity: 10_000,
            ensure_template: true,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl SearchIndexConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.node.starts_with("http://") || self.node.starts_with("https://")) {
            return Err(LoggerError::config(
                "search index",
                format!("node '{}' must be an http(s) URL", self.node),
            ));
        }
        if self.index_prefix.is_empty() {
            return Err(LoggerError::config("search index", "index_prefix is empty"));
        }
        if self.batch_size == 0 || self.queue_capacity == 0 {
            return Err(LoggerError::config(
                "search index",
                "batch_size and queue_capacity must be positive",
            ));
        }
        Ok(())
    }
}

/// Summary of a `_bulk` response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub errors: bool,
    /// Items whose status was not 2xx
    pub failed: usize,
}

impl BulkResponse {
    pub fn from_json(body: &serde_json::Value) -> Self {
        let errors = body
            .get("errors")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let failed = body
            .get("items")
            .and_then(serde_json::Value::as_array)
            .map_or(0, |items| {
                items
                    .iter()
                    .filter_map(|item| item.as_object().and_then(|op| op.values().next()))
                    .filter(|result| {
                        result
                            .get("status")
                            .and_then(serde_json::Value::as_u64)
                            .is_some_and(|status| !(200..300).contains(&status))
                    })
                    .count()
            });

        Self { errors, failed }
    }
}

/// Wire seam between the flusher thread and the remote node
pub trait BulkTransport: Send {
    fn put_template(&mut self, name: &str, body: &serde_json::Value) -> Result<()>;
    fn bulk(&mut self, body: String) -> Result<BulkResponse>;
}

/// `reqwest` blocking transport
///
/// The client is built lazily on the flusher thread, outside any async
/// runtime.
pub struct HttpTransport {
    node: String,
    timeout: Duration,
    client: Option<reqwest::blocking::Client>,
}

impl HttpTransport {
    pub fn new(node: impl Into<String>, timeout: Duration) -> Self {
        Self {
            node: node.into().trim_end_matches('/').to_string(),
            timeout,
            client: None,
        }
    }

    fn client(&mut self) -> Result<&reqwest::blocking::Client> {
        if self.client.is_none() {
            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| LoggerError::search_index(&self.node, e.to_string()))?;
            self.client = Some(client);
        }
        self.client
            .as_ref()
            .ok_or_else(|| LoggerError::search_index(&self.node, "HTTP client unavailable"))
    }
}

impl BulkTransport for HttpTransport {
    fn put_template(&mut self, name: &str, body: &serde_json::Value) -> Result<()> {
        let url = format!("{}/_index_template/{}", self.node, name);
        let response = self
            .client()?
            .put(&url)
            .json(body)
            .send()
            .map_err(|e| LoggerError::search_index(&url, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(LoggerError::search_index(url, format!("template rejected with HTTP {}", status)))
        }
    }

    fn bulk(&mut self, body: String) -> Result<BulkResponse> {
        let url = format!("{}/_bulk", self.node);
        let response = self
            .client()?
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .map_err(|e| LoggerError::search_index(&url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoggerError::search_index(url, format!("bulk request failed with HTTP {}", status)));
        }

        let parsed: serde_json::Value = response
            .json()
            .map_err(|e| LoggerError::search_index(&url, format!("unreadable bulk response: {}", e)))?;
        Ok(BulkResponse::from_json(&parsed))
    }
}

/// Index name for a record: `<prefix>-YYYY.MM.DD` (UTC date)
pub fn index_name(prefix: &str, entry: &LogEntry) -> String {
    format!("{}-{}", prefix, entry.timestamp.format("%Y.%m.%d"))
}

/// NDJSON body for the `_bulk` API
pub fn build_bulk_body(documents: &[(String, String)]) -> String {
    let mut body = String::new();
    for (index, document) in documents {
        body.push_str(&serde_json::json!({ "index": { "_index": index } }).to_string());
        body.push('\n');
        body.push_str(document);
        body.push('\n');
    }
    body
}

/// Index template: one shard, no replicas, `message` searchable and aggregatable
pub fn template_body(prefix: &str) -> serde_json::Value {
    serde_json::json!({
        "index_patterns": [format!("{}-*", prefix)],
        "template": {
            "settings": {
                "number_of_shards": 1,
                "number_of_replicas": 0
            },
            "mappings": {
                "properties": {
                    "message": {
                        "type": "text",
                        "fields": {
                            "keyword": { "type": "keyword", "ignore_above": 256 }
                        }
                    },
                    "level": { "type": "keyword" },
                    "correlationId": { "type": "keyword" },
                    "timestamp": { "type": "date" }
                }
            }
        }
    })
}

enum Command {
    Document { index: String, body: String },
    Flush(Sender<()>),
}

type SharedObservers = Arc<RwLock<EventObservers>>;

/// # Examples
///
/// ```no_run
/// use log_express::appenders::{SearchIndexAppender, SearchIndexConfig};
/// use log_express::stderr_reporter;
///
/// let appender = SearchIndexAppender::new(SearchIndexConfig::default())
///     .unwrap()
///     .on_event(stderr_reporter());
/// ```
pub struct SearchIndexAppender {
    name: String,
    config: SearchIndexConfig,
    sender: Option<Sender<Command>>,
    worker: Option<thread::JoinHandle<()>>,
    observers: SharedObservers,
    timestamp_format: TimestampFormat,
}

impl SearchIndexAppender {
    pub fn new(config: SearchIndexConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.node.clone(), config.request_timeout);
        Self::with_transport(config, transport)
    }

    /// Start the flusher thread over a custom transport
    pub fn with_transport<T: BulkTransport + 'static>(
        config: SearchIndexConfig,
        transport: T,
    ) -> Result<Self> {
        config.validate()?;

        let name = format!("search-index:{}", config.index_prefix);
        let observers: SharedObservers = Arc::new(RwLock::new(EventObservers::new()));
        let (sender, receiver) = bounded(config.queue_capacity);

        let flusher = Flusher {
            name: name.clone(),
            config: config.clone(),
            transport,
            observers: Arc::clone(&observers),
            template_ready: !config.ensure_template,
        };

        let worker = thread::Builder::new()
            .name("log-express-search-index".to_string())
            .spawn(move || flusher.run(&receiver))
            .map_err(|e| {
                LoggerError::io(
                    "spawn search index flusher",
                    "Failed to start background thread",
                    e,
                )
            })?;

        Ok(Self {
            name,
            config,
            sender: Some(sender),
            worker: Some(worker),
            observers,
            timestamp_format: TimestampFormat::default(),
        })
    }

    #[must_use]
    pub fn on_event(self, callback: EventCallback) -> Self {
        self.observers.write().register(callback);
        self
    }

    pub fn config(&self) -> &SearchIndexConfig {
        &self.config
    }

    /// Push everything buffered to the node and wait up to `timeout`
    pub fn flush_now(&self, timeout: Duration) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            return false;
        };
        let (done_tx, done_rx) = bounded(1);
        if sender.send_timeout(Command::Flush(done_tx), timeout).is_err() {
            return false;
        }
        done_rx.recv_timeout(timeout).is_ok()
    }

    fn emit(&self, event: SinkEvent) {
        self.observers.read().emit(&event);
    }
}

impl Appender for SearchIndexAppender {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(LoggerError::LoggerStopped)?;

        let document = serde_json::Value::Object(json_object(entry, &self.timestamp_format));
        let command = Command::Document {
            index: index_name(&self.config.index_prefix, entry),
            body: serde_json::to_string(&document)?,
        };

        match sender.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.emit(SinkEvent::Warning {
                    sink: self.name.clone(),
                    message: "queue full, record dropped".to_string(),
                });
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(LoggerError::sink("search index flusher has stopped"))
            }
        }
    }

    /// Delivery is interval driven; see [`SearchIndexAppender::flush_now`]
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Send the remainder and join the flusher thread
    fn close(&mut self) -> Result<()> {
        drop(self.sender.take());

        if let Some(handle) = self.worker.take() {
            let deadline = Instant::now() + self.config.request_timeout * 2;
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    return Err(LoggerError::search_index(
                        &self.config.node,
                        "flusher did not finish before the close deadline",
                    ));
                }
                thread::sleep(Duration::from_millis(10));
            }
            handle.join().map_err(|payload| {
                LoggerError::search_index(
                    &self.config.node,
                    format!("flusher panicked: {}", panic_message(payload.as_ref())),
                )
            })?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn min_level(&self) -> LogLevel {
        self.config.level
    }
}

impl Drop for SearchIndexAppender {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct Flusher<T> {
    name: String,
    config: SearchIndexConfig,
    transport: T,
    observers: SharedObservers,
    template_ready: bool,
}

impl<T: BulkTransport> Flusher<T> {
    fn run(mut self, receiver: &Receiver<Command>) {
        let mut buffer: Vec<(String, String)> = Vec::with_capacity(self.config.batch_size);
        let mut next_flush = Instant::now() + self.config.flush_interval;

        loop {
            let wait = next_flush.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(wait) {
                Ok(Command::Document { index, body }) => {
                    buffer.push((index, body));
                    if buffer.len() >= self.config.batch_size {
                        self.ship(&mut buffer);
                        next_flush = Instant::now() + self.config.flush_interval;
                    }
                }
                Ok(Command::Flush(done)) => {
                    self.ship(&mut buffer);
                    let _ = done.send(());
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.ship(&mut buffer);
                    next_flush = Instant::now() + self.config.flush_interval;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.ship(&mut buffer);
                    return;
                }
            }
        }
    }

    fn emit(&self, event: SinkEvent) {
        self.observers.read().emit(&event);
    }

    fn ship(&mut self, buffer: &mut Vec<(String, String)>) {
        if buffer.is_empty() {
            return;
        }

        if !self.template_ready {
            let body = template_body(&self.config.index_prefix);
            match self.transport.put_template(&self.config.index_prefix, &body) {
                Ok(()) => self.template_ready = true,
                Err(e) => self.emit(SinkEvent::Error {
                    sink: self.name.clone(),
                    message: e.to_string(),
                }),
            }
        }

        let documents = std::mem::take(buffer);
        let total = documents.len();

        match self.transport.bulk(build_bulk_body(&documents)) {
            Ok(response) => {
                if response.errors || response.failed > 0 {
                    self.emit(SinkEvent::Warning {
                        sink: self.name.clone(),
                        message: format!("{} of {} documents rejected", response.failed, total),
                    });
                }

                let mut per_index: BTreeMap<String, usize> = BTreeMap::new();
                for (index, _) in documents {
                    *per_index.entry(index).or_default() += 1;
                }
                for (index, count) in per_index {
                    self.emit(SinkEvent::Flushed { index, count });
                }
            }
            Err(e) => self.emit(SinkEvent::Error {
                sink: self.name.clone(),
                message: format!("{} ({} records lost)", e, total),
            }),
        }
    }
}
