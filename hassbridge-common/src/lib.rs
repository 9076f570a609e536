//! hassbridge Common Library
//!
//! This crate provides shared types and utilities for Home Assistant MQTT bridges:
//!
//! - [`config`] - Broker and logging configuration
//! - [`topics`] - Node-scoped topic builders and command parsers
//! - [`discovery`] - Home Assistant discovery documents
//! - [`session`] - MQTT client options
//! - [`error`] - Error types

pub mod config;
pub mod discovery;
pub mod error;
pub mod session;
pub mod topics;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, MqttConfig};
pub use discovery::{
    DeviceInfo, DiscoveryBuilder, DiscoveryRecord, SENSOR_COMPONENT, SWITCH_COMPONENT,
    SensorDiscovery, SensorKind, SwitchDiscovery,
};
pub use error::{Error, Result};
pub use session::{mqtt_options, qos};
pub use topics::{
    CoilCommand, DISCOVERY_PREFIX, PAYLOAD_OFF, PAYLOAD_ON, TopicBuilder, discovery_topic,
    parse_coil_command, parse_switch_payload, switch_payload,
};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// use hassbridge_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
