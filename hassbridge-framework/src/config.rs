//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{LoggingConfig, MqttConfig};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use hassbridge_framework::{BridgeConfig, MqttConfig, LoggingConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub node_id: String,
///     pub mqtt: MqttConfig,
///     pub logging: LoggingConfig,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn mqtt(&self) -> &MqttConfig {
///         &self.mqtt
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn node_id(&self) -> &str {
///         &self.node_id
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the MQTT broker configuration.
    fn mqtt(&self) -> &MqttConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Get the node id that prefixes every topic of this bridge.
    fn node_id(&self) -> &str;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. The default checks the node id and
    /// the MQTT settings; override to add bridge-specific rules.
    fn validate(&self) -> Result<()> {
        validate_node_id(self.node_id())?;
        self.mqtt()
            .validate()
            .map_err(|e| BridgeError::validation(e.to_string()))
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }
}

/// Check that a node id can be used as a topic segment.
pub fn validate_node_id(node_id: &str) -> Result<()> {
    if node_id.is_empty() {
        return Err(BridgeError::validation("node_id cannot be empty"));
    }
    if node_id.contains(['/', '+', '#']) {
        return Err(BridgeError::validation(format!(
            "node_id '{}' must not contain '/', '+' or '#'",
            node_id
        )));
    }
    Ok(())
}
