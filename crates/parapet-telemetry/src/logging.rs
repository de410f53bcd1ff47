//! Structured logging with JSON output.
//!
//! Logs go to stdout as one JSON object per line unless the pretty format
//! is selected.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// Sets up tracing-subscriber with either JSON or pretty format,
/// respecting the configured log level.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    // RUST_LOG wins over the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter, config.with_spans),
        LogFormat::Pretty => init_pretty_logging(filter),
    }
}

fn init_json_logging(filter: EnvFilter, with_spans: bool) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(with_spans)
        .with_span_list(false)
        .with_file(false)
        .with_line_number(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

fn init_pretty_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Standard log event names.
pub mod events {
    /// Service is starting up.
    pub const STARTUP: &str = "startup";

    /// Service is shutting down.
    pub const SHUTDOWN: &str = "shutdown";

    /// Server is listening on an address.
    pub const LISTENING: &str = "listening";

    /// The OpenAPI document was materialized.
    pub const SPEC_RESOLVED: &str = "spec_resolved";

    /// Request has been completed.
    pub const REQUEST_COMPLETED: &str = "request_completed";

    /// Request data failed schema validation.
    pub const VALIDATION_FAILURE: &str = "validation_failure";

    /// A handler raised an application exception.
    pub const API_EXCEPTION: &str = "api_exception";

    /// A bearer token failed verification.
    pub const TOKEN_REJECTED: &str = "token_rejected";

    /// A service skeleton was written to disk.
    pub const SCAFFOLD_CREATED: &str = "scaffold_created";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to ensure consistent field naming.
#[macro_export]
macro_rules! log_startup {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::STARTUP,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_shutdown {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::SHUTDOWN,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_listening {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::LISTENING,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_spec_resolved {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::SPEC_RESOLVED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_request_completed {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::REQUEST_COMPLETED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_validation_failure {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::VALIDATION_FAILURE,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_api_exception {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::API_EXCEPTION,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_token_rejected {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::TOKEN_REJECTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_scaffold_created {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::SCAFFOLD_CREATED,
            $($field)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // Subscriber initialization is process-global, so only the
    // configuration logic is tested here.

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("invalid"), None);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("Pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn event_names_are_snake_case() {
        for name in [
            events::STARTUP,
            events::SHUTDOWN,
            events::LISTENING,
            events::SPEC_RESOLVED,
            events::REQUEST_COMPLETED,
            events::VALIDATION_FAILURE,
            events::API_EXCEPTION,
            events::TOKEN_REJECTED,
            events::SCAFFOLD_CREATED,
        ] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
