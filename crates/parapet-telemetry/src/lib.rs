//! Logging infrastructure for Parapet services.
//!
//! This crate provides:
//! - Structured JSON (or pretty) logging via `tracing-subscriber`
//! - Standard event names and `log_*!` macros so every crate logs the
//!   same fields the same way
//!
//! # Usage
//!
//! ```ignore
//! use parapet_telemetry::{LogFormat, Telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::new()
//!     .with_log_level("debug")
//!     .with_log_format(LogFormat::Pretty);
//!
//! let telemetry = Telemetry::init(config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::events;

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Main telemetry handle.
pub struct Telemetry {
    config: TelemetryConfig,
}

impl Telemetry {
    /// Initialize logging with the given configuration.
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        logging::init_logging(&config)?;
        crate::log_startup!(service = %config.service_name, "telemetry initialized");
        Ok(Self { config })
    }

    /// Build a handle without installing a subscriber.
    ///
    /// Use this when logging is already initialized (e.g., in tests).
    pub fn init_without_logging(config: TelemetryConfig) -> Self {
        Self { config }
    }

    /// Emit the shutdown event.
    pub fn shutdown(&self) {
        crate::log_shutdown!(service = %self.config.service_name, "shutting down");
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}
