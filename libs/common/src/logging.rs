//! Unified logging module for Responder binaries
//!
//! Console output always; an optional daily-rolling file is added when the
//! configuration asks for it.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use errors::{ResponderError, ResponderResult};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable overriding the log root directory
pub const LOG_DIR_ENV: &str = "RESPONDER_LOG_DIR";

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message key=value`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] Alert presented alert=...`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.3fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking file writer alive for the process lifetime
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Logging section of a service configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    #[serde(default = "default_level")]
    pub level: String,
    /// Log root directory
    #[serde(default)]
    pub dir: Option<String>,
    /// Write a daily-rolling log file in addition to the console
    #[serde(default)]
    pub file: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: None,
            file: false,
        }
    }
}

/// Resolved logging parameters for one process
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub service_name: String,
    pub console_level: Level,
    /// `Some` enables the rolling file layer
    pub log_dir: Option<PathBuf>,
    pub ansi: bool,
}

impl LogConfig {
    pub fn from_config(service_name: &str, config: &LoggingConfig, ansi: bool) -> Self {
        let log_dir = config
            .file
            .then(|| log_root(config.dir.as_deref()).join(service_name));

        Self {
            service_name: service_name.to_string(),
            console_level: parse_level(&config.level),
            log_dir,
            ansi,
        }
    }
}

/// Parse a level name, falling back to INFO
pub fn parse_level(level: &str) -> Level {
    level.trim().parse::<Level>().unwrap_or(Level::INFO)
}

/// Log root directory
///
/// Priority: `RESPONDER_LOG_DIR` env > configured dir > "logs"
pub fn log_root(config_dir: Option<&str>) -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(config_dir.unwrap_or("logs")))
}

/// Install the global subscriber
///
/// RUST_LOG, when set, replaces the configured level entirely.
pub fn init_with_config(config: LogConfig) -> ResponderResult<()> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => EnvFilter::new(config.console_level.as_str().to_lowercase()),
    };

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
            match guards.lock() {
                Ok(mut guards) => guards.push(guard),
                Err(poisoned) => poisoned.into_inner().push(guard),
            }

            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking)
                    .event_format(BracketedLevelFormat)
                    .boxed(),
            )
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ResponderError::config(format!("Failed to init logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level(" WARN "), Level::WARN);
        assert_eq!(parse_level("chatty"), Level::INFO);
    }

    #[test]
    fn test_file_layer_disabled_by_default() {
        let config = LogConfig::from_config("responder", &LoggingConfig::default(), false);
        assert!(config.log_dir.is_none());
        assert_eq!(config.console_level, Level::INFO);
    }

    #[test]
    fn test_file_layer_uses_service_subdirectory() {
        let logging = LoggingConfig {
            level: "debug".into(),
            dir: Some("/var/log/responder".into()),
            file: true,
        };
        let config = LogConfig::from_config("responder", &logging, false);
        let dir = config.log_dir.expect("file logging enabled");
        assert!(dir.ends_with("responder"));
    }
}
