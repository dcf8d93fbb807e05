//! Tracing subscriber setup.
//!
//! Remora crates only emit `tracing` events; a process decides how they are
//! rendered by installing a subscriber once at startup:
//!
//! | Level | Events |
//! |-------|--------|
//! | `debug` | token lifecycle (submitted, executing, forwarded, consumed) |
//! | `info` | dispatcher and subscriber start/stop, registration changes |
//! | `warn` | discarded results, failed fire-and-forget calls, malformed records |
//! | `error` | a dispatcher loop ending on a store error |
//!
//! # Example
//!
//! ```
//! use remora_core::{TracingConfig, TracingFormat};
//! use tracing::Level;
//!
//! // Development: pretty output with token lifecycle events
//! TracingConfig::default()
//!     .with_level(Level::DEBUG)
//!     .with_format(TracingFormat::Pretty)
//!     .init();
//!
//! // Production: JSON for log aggregation, quiet store internals
//! let _prod = TracingConfig::default()
//!     .with_format(TracingFormat::Json)
//!     .with_env_filter("remora_rpc=info,remora_store=warn");
//! ```

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable colored output (default).
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

/// How the process renders remora's tracing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Maximum log level, used when no env filter is given or it fails to
    /// parse.
    pub level: Level,
    /// Output format.
    pub format: TracingFormat,
    /// Target-specific filter (e.g. `"remora_rpc=debug,remora_store=warn"`).
    pub env_filter: Option<String>,
    /// Whether to include span enter/exit events.
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// Default settings: `info`, pretty, no filter, no span events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets a target-specific filter.
    ///
    /// Format: `target=level,target=level,...`
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::new(self.level.as_str()),
        }
    }

    /// Installs the global subscriber.
    ///
    /// Returns `false` if a subscriber was already installed, in which case
    /// that one stays in effect.
    pub fn init(&self) -> bool {
        let env_filter = self.filter();
        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        let installed = match self.format {
            TracingFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_span_events(span_events),
                )
                .try_init()
                .is_ok(),
            TracingFormat::Compact => tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_span_events(span_events),
                )
                .try_init()
                .is_ok(),
            TracingFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(span_events),
                )
                .try_init()
                .is_ok(),
        };

        if installed {
            tracing::info!(level = %self.level, format = ?self.format, "tracing initialized");
        }
        installed
    }
}
