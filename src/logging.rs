//!
//! Logging
//!
//! Providers log through a [`Logger`] handle so callers can swap or silence it per
//! provider. The default [`TracingLogger`] forwards to `tracing`; binaries can use
//! [`layer`] and [`env_filter`] to render this crate's events.

use crate::llm::LogLevel;
use std::fmt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::{self, Directive};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Layer};

/// Target prefix of every event emitted by this crate.
pub const TARGET_PREFIX: &str = "llmgate";

/// Logger handle held by each provider.
pub trait Logger: Send + Sync + fmt::Debug {
    /// Most verbose level this logger emits.
    fn level(&self) -> LogLevel;
    /// Logs `message` at debug level.
    fn debug(&self, message: &str);
    /// Logs `message` at info level.
    fn info(&self, message: &str);
    /// Logs `message` at warn level.
    fn warn(&self, message: &str);
    /// Logs `message` at error level.
    fn error(&self, message: &str);
}

/// [`Logger`] that forwards to `tracing`, dropping messages above its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingLogger {
    level: LogLevel,
}

impl TracingLogger {
    /// Creates a logger emitting messages at `level` and below.
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.level
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl Logger for TracingLogger {
    fn level(&self) -> LogLevel {
        self.level
    }

    fn debug(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!("{message}");
        }
    }

    fn info(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            tracing::info!("{message}");
        }
    }

    fn warn(&self, message: &str) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!("{message}");
        }
    }

    fn error(&self, message: &str) {
        if self.enabled(LogLevel::Error) {
            tracing::error!("{message}");
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

/// Formatting layer that renders only events emitted by this crate.
pub fn layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let only_this_crate = filter::filter_fn(|meta| meta.target().starts_with(TARGET_PREFIX));

    tracing_fmt::layer()
        .with_target(true)
        .with_level(true)
        .event_format(tracing_fmt::format().compact())
        .with_filter(only_this_crate)
}

/// `RUST_LOG` filter (or `default` when unset) with `level` applied to this crate.
pub fn env_filter(default: &str, level: LogLevel) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    match level_directive(level) {
        Some(directive) => base.add_directive(directive),
        None => base,
    }
}

/// Directive such as `llmgate=debug`.
pub fn level_directive(level: LogLevel) -> Option<Directive> {
    let filter = LevelFilter::from(level);
    format!("{TARGET_PREFIX}={filter}").to_lowercase().parse().ok()
}

/// Installs a global subscriber printing this crate's events at `level`.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init(level: LogLevel) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter("warn", level))
        .with(layer())
        .try_init()
}
