//! Subscriber setup
//!
//! Logs go to stderr; stdout carries the invocation report and, when metric
//! export is on, the embedded-metric-format lines.

use anyhow::Context;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened
    Json,
    /// Multi-line human output
    Pretty,
    /// Single-line human output
    Compact,
}

/// Resolved logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LogConfig {
    /// Read `SIGNING_KEY_RENEWAL_LOG` (or `RUST_LOG`) and `SIGNING_KEY_RENEWAL_LOG_FORMAT`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup("SIGNING_KEY_RENEWAL_LOG").or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }

        if let Some(format) = lookup("SIGNING_KEY_RENEWAL_LOG_FORMAT") {
            config.format = match format.to_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Json,
            };
        }

        config
    }
}

/// Install the global subscriber
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("invalid log filter '{}'", config.level))?;

    let registry = Registry::default().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init(),
    };

    result.context("failed to install tracing subscriber")
}
