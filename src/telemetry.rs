// Log subscriber setup for applications embedding the coordinator. The
// library itself only emits `tracing` events.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Error, Debug)]
pub enum TracingError {
    #[error("Failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to parse log filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    // Used when RUST_LOG is not set
    pub default_level: Level,
    pub format: LogFormat,
    pub include_target: bool,
    // Explicit directive, takes precedence over RUST_LOG
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            format: LogFormat::Pretty,
            include_target: true,
            filter: None,
        }
    }
}

impl TracingConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.filter {
            Some(filter) => Ok(EnvFilter::try_new(filter)?),
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), self.default_level))
            })),
        }
    }
}

/// Installs the global subscriber. Call once at startup.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer().pretty().with_target(config.include_target);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        LogFormat::Compact => {
            let layer = fmt::layer().compact().with_target(config.include_target);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        LogFormat::Json => {
            let layer = fmt::layer().json().with_target(config.include_target);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
    }

    Ok(())
}
