//! Layered service configuration
//!
//! Serialized defaults, then `log-express.toml` when present, then the
//! environment: `HOST`/`PORT` for the listener and `LOG_EXPRESS_*` with `__`
//! as the nesting separator, e.g. `LOG_EXPRESS_LOGGING__CONSOLE__LEVEL=debug`.

use crate::appenders::{
    ConsoleAppender, DailyRotateFileAppender, DailyRotatePolicy, SearchIndexAppender,
    SearchIndexConfig,
};
use crate::core::{
    stderr_reporter, EventCallback, LogLevel, Logger, LoggerError, OutputFormat, Result,
    DEFAULT_QUEUE_CAPACITY,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "log-express.toml";
pub const ENV_PREFIX: &str = "LOG_EXPRESS_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// Listen target; hostnames are resolved at bind time
    pub fn bind_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Added to every record as `service`; empty to omit
    pub service: String,
    pub queue_capacity: usize,
    pub console: ConsoleConfig,
    pub file: FileConfig,
    pub search_index: SearchIndexSettings,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service: "log-express".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
            search_index: SearchIndexSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub level: LogLevel,
    pub format: OutputFormat,
    pub colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Http,
            format: OutputFormat::Json,
            colors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    /// One daily-rotating file sink per level
    pub levels: Vec<LogLevel>,
    pub date_pattern: String,
    pub max_size: u64,
    /// 0 keeps history forever
    pub max_age_secs: u64,
    pub zipped_archive: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("logs"),
            levels: vec![LogLevel::Error, LogLevel::Info, LogLevel::Http],
            date_pattern: "%Y-%m-%d".to_string(),
            max_size: 1024 * 1024,
            max_age_secs: 24 * 3600,
            zipped_archive: true,
        }
    }
}

impl FileConfig {
    pub fn policy(&self) -> DailyRotatePolicy {
        DailyRotatePolicy::new()
            .with_date_pattern(self.date_pattern.clone())
            .with_max_size(self.max_size)
            .with_max_age((self.max_age_secs > 0).then(|| Duration::from_secs(self.max_age_secs)))
            .with_zipped_archive(self.zipped_archive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchIndexSettings {
    pub enabled: bool,
    pub node: String,
    pub index_prefix: String,
    pub level: LogLevel,
    pub flush_interval_ms: u64,
    pub batch_size: usize,
    pub ensure_template: bool,
}

impl Default for SearchIndexSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            node: "http://localhost:9200".to_string(),
            index_prefix: "log-express".to_string(),
            level: LogLevel::Http,
            flush_interval_ms: 2000,
            batch_size: 100,
            ensure_template: true,
        }
    }
}

impl SearchIndexSettings {
    pub fn to_config(&self) -> SearchIndexConfig {
        SearchIndexConfig {
            node: self.node.clone(),
            index_prefix: self.index_prefix.clone(),
            level: self.level,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            batch_size: self.batch_size,
            ensure_template: self.ensure_template,
            ..SearchIndexConfig::default()
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(LoggerError::config("logging", "queue_capacity must be positive"));
        }
        if self.file.enabled {
            if self.file.levels.is_empty() {
                return Err(LoggerError::config("logging.file", "levels is empty"));
            }
            self.file.policy().validate()?;
        }
        if self.search_index.enabled {
            self.search_index.to_config().validate()?;
        }
        Ok(())
    }

    /// Build the service logger, reporting sink events on stderr
    pub fn build_logger(&self) -> Result<Logger> {
        self.build_logger_with(stderr_reporter())
    }

    /// Build the service logger with a custom sink event observer
    pub fn build_logger_with(&self, observer: EventCallback) -> Result<Logger> {
        self.validate()?;

        let mut builder = Logger::builder().async_mode(self.queue_capacity);
        if !self.service.is_empty() {
            builder = builder.default_field("service", self.service.as_str());
        }

        if self.console.enabled {
            builder = builder.appender(
                ConsoleAppender::new()
                    .with_min_level(self.console.level)
                    .with_output_format(self.console.format)
                    .with_colors(self.console.colors),
            );
        }

        if self.file.enabled {
            for level in &self.file.levels {
                let appender =
                    DailyRotateFileAppender::with_policy(&self.file.dir, *level, self.file.policy())?
                        .on_event(observer.clone());
                builder = builder.appender(appender);
            }
        }

        if self.search_index.enabled {
            let appender = SearchIndexAppender::new(self.search_index.to_config())?
                .on_event(observer);
            builder = builder.appender(appender);
        }

        Ok(builder.build())
    }
}

impl AppConfig {
    /// Defaults, `path` if it exists, then the environment
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(
                Env::raw()
                    .only(&["HOST", "PORT"])
                    .map(|key| format!("server.{}", key.as_str().to_ascii_lowercase()).into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> std::result::Result<Self, figment::Error> {
        Self::load_from(Self::figment(CONFIG_FILE))
    }

    pub fn load_from(figment: Figment) -> std::result::Result<Self, figment::Error> {
        let config: AppConfig = figment.extract()?;

        if let Err(e) = config.logging.validate() {
            return Err(figment::Error::from(e.to_string()));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.logging.console.level, LogLevel::Http);
        assert_eq!(
            config.logging.file.levels,
            vec![LogLevel::Error, LogLevel::Info, LogLevel::Http]
        );
        assert!(!config.logging.search_index.enabled);
        assert_eq!(config.logging.search_index.flush_interval_ms, 2000);
    }

    #[test]
    fn test_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "log-express.toml",
                r#"
                [server]
                port = 8080

                [logging.console]
                level = "debug"
                format = "text"

                [logging.file]
                levels = ["error"]
                "#,
            )?;
            jail.set_env("HOST", "127.0.0.1");
            jail.set_env("LOG_EXPRESS_LOGGING__SEARCH_INDEX__ENABLED", "true");
            jail.set_env("LOG_EXPRESS_LOGGING__SEARCH_INDEX__INDEX_PREFIX", "svc");

            let config = AppConfig::load_from(AppConfig::figment("log-express.toml"))?;
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.logging.console.level, LogLevel::Debug);
            assert_eq!(config.logging.console.format, OutputFormat::Text);
            assert_eq!(config.logging.file.levels, vec![LogLevel::Error]);
            assert!(config.logging.search_index.enabled);
            assert_eq!(config.logging.search_index.index_prefix, "svc");
            Ok(())
        });
    }

    #[tokio::test]
    async fn test_hostname_binds() {
        let server = ServerConfig {
            host: "localhost".to_string(),
            port: 0,
        };

        let listener = tokio::net::TcpListener::bind(server.bind_addr()).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[test]
    fn test_invalid_values_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("LOG_EXPRESS_LOGGING__FILE__DATE_PATTERN", "%Q");
            assert!(AppConfig::load_from(AppConfig::figment("missing.toml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_build_logger_registers_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            file: FileConfig {
                dir: dir.path().to_path_buf(),
                ..FileConfig::default()
            },
            ..LoggingConfig::default()
        };

        let logger = config.build_logger().unwrap();
        assert_eq!(logger.appender_count(), 4);
        assert!(logger.enabled(LogLevel::Http));
        assert!(!logger.enabled(LogLevel::Verbose));
        assert!(dir.path().join("error").is_dir());
        logger.shutdown(Duration::from_secs(2));
    }
}
