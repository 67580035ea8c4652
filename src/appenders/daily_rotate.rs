//! Daily rotating file appender
//!
//! One appender per level writes `<dir>/<level>/<level>-<date>.log`. The
//! active file is replaced when the date moves forward or the file
//! reaches the size limit; the replaced file is archived (gzip), made
//! read-only, and anything older than the retention window is deleted.

use crate::core::error::{LoggerError, Result};
use crate::core::events::{EventCallback, EventObservers, SinkEvent};
use crate::core::{Appender, LogEntry, LogLevel, OutputFormat, TimestampFormat};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Rotation and retention settings
///
/// # Examples
///
/// ```
/// use log_express::appenders::DailyRotatePolicy;
/// use std::time::Duration;
///
/// let policy = DailyRotatePolicy::new()
///     .with_date_pattern("%Y-%m-%d")
///     .with_max_size(1024 * 1024)
///     .with_max_age(Some(Duration::from_secs(24 * 3600)))
///     .with_zipped_archive(true);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRotatePolicy {
    /// strftime pattern substituted for `%DATE%`
    pub date_pattern: String,
    /// Size in bytes at which the active file is rotated
    pub max_size: u64,
    /// History older than this is deleted; `None` keeps everything
    pub max_age: Option<Duration>,
    /// Gzip rotated files
    pub zipped_archive: bool,
}

impl Default for DailyRotatePolicy {
    fn default() -> Self {
        Self {
            date_pattern: "%Y-%m-%d".to_string(),
            max_size: 1024 * 1024,
            max_age: Some(Duration::from_secs(24 * 3600)),
            zipped_archive: true,
        }
    }
}

impl DailyRotatePolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_date_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.date_pattern = pattern.into();
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_zipped_archive(mut self, enabled: bool) -> Self {
        self.zipped_archive = enabled;
        self
    }

    /// Reject patterns chrono cannot render and sizes that would rotate on every write
    pub fn validate(&self) -> Result<()> {
        if self.date_pattern.is_empty() {
            return Err(LoggerError::config("daily rotate file", "date pattern is empty"));
        }
        if StrftimeItems::new(&self.date_pattern).any(|item| matches!(item, Item::Error)) {
            return Err(LoggerError::config(
                "daily rotate file",
                format!("invalid date pattern '{}'", self.date_pattern),
            ));
        }
        if self.max_size == 0 {
            return Err(LoggerError::config("daily rotate file", "max_size must be positive"));
        }
        Ok(())
    }
}

struct ActiveFile {
    writer: BufWriter<File>,
    path: PathBuf,
    date: String,
    sequence: u32,
    size: u64,
}

/// # Examples
///
/// ```no_run
/// use log_express::appenders::{DailyRotateFileAppender, DailyRotatePolicy};
/// use log_express::{stderr_reporter, LogLevel};
///
/// let appender = DailyRotateFileAppender::with_policy("logs", LogLevel::Error, DailyRotatePolicy::new())
///     .unwrap()
///     .on_event(stderr_reporter());
/// ```
pub struct DailyRotateFileAppender {
    dir: PathBuf,
    level: LogLevel,
    name: String,
    policy: DailyRotatePolicy,
    active: Option<ActiveFile>,
    /// Latest record timestamp written; dates never move backwards
    newest: Option<DateTime<Utc>>,
    observers: EventObservers,
    output_format: OutputFormat,
    timestamp_format: TimestampFormat,
}

impl DailyRotateFileAppender {
    /// Appender for `<root>/<level>/<level>-%DATE%.log` with default policy
    pub fn new<P: AsRef<Path>>(root: P, level: LogLevel) -> Result<Self> {
        Self::with_policy(root, level, DailyRotatePolicy::default())
    }

    /// The level directory is created now; the file itself is opened on the
    /// first write so observers registered with [`on_event`](Self::on_event)
    /// see its creation.
    pub fn with_policy<P: AsRef<Path>>(
        root: P,
        level: LogLevel,
        policy: DailyRotatePolicy,
    ) -> Result<Self> {
        policy.validate()?;

        let dir = root.as_ref().join(level.to_str());
        fs::create_dir_all(&dir).map_err(|e| {
            LoggerError::io(
                "create log directory",
                format!("Failed to create directory '{}'", dir.display()),
                e,
            )
        })?;

        Ok(Self {
            dir,
            level,
            name: format!("daily-rotate-file:{}", level),
            policy,
            active: None,
            newest: None,
            observers: EventObservers::new(),
            output_format: OutputFormat::Json,
            timestamp_format: TimestampFormat::default(),
        })
    }

    /// Register an observer for lifecycle events
    #[must_use]
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.observers.register(callback);
        self
    }

    #[must_use]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> &DailyRotatePolicy {
        &self.policy
    }

    /// Path of the file currently written, if one is open
    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|active| active.path.as_path())
    }

    /// Size in bytes of the active file
    pub fn current_size(&self) -> u64 {
        self.active.as_ref().map_or(0, |active| active.size)
    }

    /// `%DATE%` rendered in local time
    pub fn render_date(&self, timestamp: &DateTime<Utc>) -> String {
        timestamp
            .with_timezone(&Local)
            .format(&self.policy.date_pattern)
            .to_string()
    }

    /// `<level>-<date>.log`, or `<level>-<date>.<n>.log` after size rotations
    pub fn file_path(&self, date: &str, sequence: u32) -> PathBuf {
        let file_name = if sequence == 0 {
            format!("{}-{}.log", self.level, date)
        } else {
            format!("{}-{}.{}.log", self.level, date, sequence)
        };
        self.dir.join(file_name)
    }

    /// First sequence for `date` that is neither archived, read-only nor full
    fn next_free_sequence(&self, date: &str, start: u32) -> u32 {
        let mut sequence = start;
        loop {
            let path = self.file_path(date, sequence);
            if gz_path(&path).exists() {
                sequence += 1;
                continue;
            }
            match fs::metadata(&path) {
                Ok(meta) if meta.permissions().readonly() || meta.len() >= self.policy.max_size => {
                    sequence += 1;
                }
                _ => return sequence,
            }
        }
    }

    fn open(&mut self, date: String, sequence: u32) -> Result<()> {
        let path = self.file_path(&date, sequence);
        let existed = path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                LoggerError::log_file(
                    path.display().to_string(),
                    format!("Failed to open: {}", e),
                )
            })?;

        // Held until the file is rotated or the appender closed
        file.try_lock_exclusive()
            .map_err(|_| LoggerError::locked(path.display().to_string()))?;

        let size = file
            .metadata()
            .map_err(|e| {
                LoggerError::log_file(
                    path.display().to_string(),
                    format!("Cannot access file metadata: {}", e),
                )
            })?
            .len();

        if !existed {
            self.observers.emit(&SinkEvent::Created { path: path.clone() });
        }

        self.active = Some(ActiveFile {
            writer: BufWriter::new(file),
            path,
            date,
            sequence,
            size,
        });
        Ok(())
    }

    /// Flush, unlock and release the active file
    fn close_active(&mut self) -> Result<Option<PathBuf>> {
        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };

        active.writer.flush().map_err(|e| {
            LoggerError::rotation(
                active.path.display().to_string(),
                format!("Failed to flush before rotation: {}", e),
            )
        })?;
        let _ = FileExt::unlock(active.writer.get_ref());
        Ok(Some(active.path))
    }

    /// Replace the active file with the one for `date`
    fn rotate(&mut self, date: String) -> Result<()> {
        let start = match &self.active {
            Some(active) if active.date == date => active.sequence + 1,
            _ => 0,
        };

        let previous = self.close_active()?;
        let sequence = self.next_free_sequence(&date, start);
        self.open(date, sequence)?;

        if let (Some(from), Some(active)) = (previous, self.active.as_ref()) {
            let to = active.path.clone();
            self.observers.emit(&SinkEvent::Rotated {
                from: from.clone(),
                to,
            });
            self.retire(&from);
        }

        self.purge_expired();
        Ok(())
    }

    /// Archive a rotated file and make it read-only
    ///
    /// Failures are reported as events; the new file is already open.
    fn retire(&self, path: &Path) {
        let history = if self.policy.zipped_archive {
            match compress_file(path) {
                Ok(gz) => {
                    self.observers.emit(&SinkEvent::Archived { path: gz.clone() });
                    gz
                }
                Err(e) => {
                    self.observers.emit(&SinkEvent::Error {
                        sink: self.name.clone(),
                        message: e.to_string(),
                    });
                    path.to_path_buf()
                }
            }
        } else {
            path.to_path_buf()
        };

        if let Err(e) = make_read_only(&history) {
            self.observers.emit(&SinkEvent::Warning {
                sink: self.name.clone(),
                message: format!("Failed to make '{}' read-only: {}", history.display(), e),
            });
        }
    }

    /// Delete history files for this level older than `max_age`
    fn purge_expired(&self) {
        let Some(max_age) = self.policy.max_age else {
            return;
        };
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return;
        };

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.observers.emit(&SinkEvent::Warning {
                    sink: self.name.clone(),
                    message: format!("Cannot scan '{}': {}", self.dir.display(), e),
                });
                return;
            }
        };

        let prefix = format!("{}-", self.level);
        let active = self.active_path().map(Path::to_path_buf);

        for entry in entries.flatten() {
            let path = entry.path();
            if Some(&path) == active.as_ref() {
                continue;
            }
            let is_history = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && (n.ends_with(".log") || n.ends_with(".log.gz")));
            if !is_history {
                continue;
            }

            let expired = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| modified < cutoff);
            if !expired {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => self.observers.emit(&SinkEvent::Deleted { path }),
                Err(e) => self.observers.emit(&SinkEvent::Warning {
                    sink: self.name.clone(),
                    message: format!("Failed to delete '{}': {}", path.display(), e),
                }),
            }
        }
    }

    fn format_line(&self, entry: &LogEntry) -> String {
        let mut line = self.output_format.format(entry, &self.timestamp_format);
        line.push('\n');
        line
    }
}

impl Appender for DailyRotateFileAppender {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        // A record stamped before the newest one seen goes into the current period
        let stamp = match self.newest {
            Some(newest) if newest > entry.timestamp => newest,
            _ => entry.timestamp,
        };
        self.newest = Some(stamp);
        let date = self.render_date(&stamp);

        let needs_rotation = match &self.active {
            None => true,
            Some(active) => active.date != date || active.size >= self.policy.max_size,
        };

        if needs_rotation {
            if let Err(e) = self.rotate(date) {
                self.observers.emit(&SinkEvent::Error {
                    sink: self.name.clone(),
                    message: e.to_string(),
                });
                if self.active.is_none() {
                    return Err(e);
                }
            }
        }

        let line = self.format_line(entry);
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| LoggerError::sink("Writer not initialized"))?;

        active.writer.write_all(line.as_bytes()).map_err(|e| {
            LoggerError::log_file(
                active.path.display().to_string(),
                format!("Failed to write log entry: {}", e),
            )
        })?;
        active.size += line.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(active) = self.active.as_mut() {
            active.writer.flush().map_err(|e| {
                LoggerError::log_file(
                    active.path.display().to_string(),
                    format!("Failed to flush: {}", e),
                )
            })?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.close_active().map(|_| ())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn min_level(&self) -> LogLevel {
        self.level
    }
}

impl Drop for DailyRotateFileAppender {
    fn drop(&mut self) {
        let _ = self.close_active();
    }
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

fn make_read_only(path: &Path) -> std::io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions)
}

/// Gzip `path` into `<path>.gz` and remove the original
///
/// Writes to a temporary file first so a failed compression never loses
/// the uncompressed log.
fn compress_file(path: &Path) -> Result<PathBuf> {
    use std::io::{BufReader, Read};

    let gz = gz_path(path);
    let mut temp_name = gz.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp = PathBuf::from(temp_name);

    let input = File::open(path).map_err(|e| {
        LoggerError::io(
            "compress log file",
            format!("Failed to open file for compression: {}", path.display()),
            e,
        )
    })?;
    let mut reader = BufReader::with_capacity(64 * 1024, input);

    let output = File::create(&temp).map_err(|e| {
        LoggerError::io(
            "compress log file",
            format!("Failed to create temporary compressed file: {}", temp.display()),
            e,
        )
    })?;
    let mut encoder = flate2::write::GzEncoder::new(
        BufWriter::with_capacity(64 * 1024, output),
        flate2::Compression::default(),
    );

    let mut buffer = vec![0u8; 64 * 1024];
    let streamed: std::io::Result<()> = (|| {
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            encoder.write_all(&buffer[..read])?;
        }
        encoder.finish()?.flush()
    })();

    if let Err(e) = streamed {
        let _ = fs::remove_file(&temp);
        return Err(LoggerError::io(
            "compress log file",
            format!("Failed to compress {}", path.display()),
            e,
        ));
    }

    fs::rename(&temp, &gz).map_err(|e| {
        let _ = fs::remove_file(&temp);
        LoggerError::io(
            "compress log file",
            format!("Failed to rename compressed file to: {}", gz.display()),
            e,
        )
    })?;

    if let Err(e) = fs::remove_file(path) {
        eprintln!(
            "[LOGGER WARNING] Compression succeeded but failed to remove original file {}: {}",
            path.display(),
            e
        );
    }

    Ok(gz)
}
