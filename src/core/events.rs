//! Sink lifecycle events and observer registration
//!
//! Sinks report file creation, rotation, archiving, deletion, flushes and
//! transport problems through registered callbacks instead of raising them
//! to the code that issued the log call.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Observable event emitted by a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// A new active log file was opened
    Created { path: PathBuf },
    /// The active file was replaced
    Rotated { from: PathBuf, to: PathBuf },
    /// A rotated file was compressed
    Archived { path: PathBuf },
    /// A file past the retention window was removed
    Deleted { path: PathBuf },
    /// A batch reached the remote index
    Flushed { index: String, count: usize },
    /// Recoverable problem (partial bulk failure, dropped record, ...)
    Warning { sink: String, message: String },
    /// Write or transport failure
    Error { sink: String, message: String },
}

impl SinkEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, SinkEvent::Error { .. })
    }
}

impl fmt::Display for SinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkEvent::Created { path } => write!(f, "New log file created: {}", path.display()),
            SinkEvent::Rotated { from, to } => write!(
                f,
                "Rotating log file from {} to {}",
                from.display(),
                to.display()
            ),
            SinkEvent::Archived { path } => write!(f, "Log file archived: {}", path.display()),
            SinkEvent::Deleted { path } => write!(f, "Log file deleted: {}", path.display()),
            SinkEvent::Flushed { index, count } => {
                write!(f, "Flushed {} records to index {}", count, index)
            }
            SinkEvent::Warning { sink, message } => write!(f, "{} warning: {}", sink, message),
            SinkEvent::Error { sink, message } => write!(f, "{} error: {}", sink, message),
        }
    }
}

/// Callback invoked for every event a sink emits
pub type EventCallback = Arc<dyn Fn(&SinkEvent) + Send + Sync>;

/// Set of registered observers for one sink
#[derive(Clone, Default)]
pub struct EventObservers {
    callbacks: Vec<EventCallback>,
}

impl EventObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: EventCallback) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Deliver an event to every observer
    ///
    /// A panicking observer is reported on stderr and does not stop the others.
    pub fn emit(&self, event: &SinkEvent) {
        for callback in &self.callbacks {
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event)));
            if let Err(payload) = result {
                eprintln!(
                    "[LOGGER ERROR] Sink event observer panicked on '{}': {}",
                    event,
                    super::logger::panic_message(payload.as_ref())
                );
            }
        }
    }
}

impl fmt::Debug for EventObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventObservers")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Observer that writes every event to stderr
///
/// Stderr is the process diagnostic channel, so events never loop back
/// into the sink set.
pub fn stderr_reporter() -> EventCallback {
    Arc::new(|event: &SinkEvent| match event {
        SinkEvent::Error { .. } => eprintln!("[LOGGER ERROR] {}", event),
        SinkEvent::Warning { .. } => eprintln!("[LOGGER WARNING] {}", event),
        _ => eprintln!("[LOGGER] {}", event),
    })
}
