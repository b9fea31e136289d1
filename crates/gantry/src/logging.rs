//! Structured logging.
//!
//! Logs go to stderr so that stdout carries only the command's output
//! (reports, documents).

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON, one object per line.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set (default: "info").
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    Init(String),
}

/// Install the global subscriber. `RUST_LOG` wins over `config.level`.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .flatten_event(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

/// Standard log event names.
pub mod events {
    /// A deployment run has started.
    pub const RUN_STARTED: &str = "run_started";

    /// API and endpoint specifications have been loaded.
    pub const SPECS_LOADED: &str = "specs_loaded";

    /// A built-in plugin registered its hooks.
    pub const PLUGIN_REGISTERED: &str = "plugin_registered";

    /// A lambda has been created or updated and aliased.
    pub const LAMBDA_DEPLOYED: &str = "lambda_deployed";

    /// An injector wrote integration data into an endpoint.
    pub const INTEGRATION_APPLIED: &str = "integration_applied";

    /// A remote REST API has been created or updated.
    pub const API_DEPLOYED: &str = "api_deployed";

    /// Creating or updating a remote REST API failed.
    pub const API_DEPLOY_FAILED: &str = "api_deploy_failed";

    /// A REST API has been deployed to its stage.
    pub const API_PUBLISHED: &str = "api_published";

    /// A deployment run has finished.
    pub const RUN_COMPLETED: &str = "run_completed";
}

#[macro_export]
macro_rules! log_run_started {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::RUN_STARTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_specs_loaded {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::SPECS_LOADED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_plugin_registered {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::PLUGIN_REGISTERED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_lambda_deployed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::LAMBDA_DEPLOYED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_integration_applied {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::INTEGRATION_APPLIED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_api_deployed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::API_DEPLOYED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_api_deploy_failed {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::API_DEPLOY_FAILED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_api_published {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::API_PUBLISHED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_run_completed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::RUN_COMPLETED,
            $($field)*
        )
    };
}
