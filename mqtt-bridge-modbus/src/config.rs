//! Configuration for the Modbus bridge.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hassbridge_common::{DISCOVERY_PREFIX, LoggingConfig, MqttConfig};
use hassbridge_framework::{BridgeConfig, BridgeError, validate_node_id};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusBridgeConfig {
    /// Node id prefixing every state and command topic
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// MQTT broker settings
    pub mqtt: MqttConfig,

    /// Shared Modbus TCP endpoint
    pub modbus: ModbusEndpointConfig,

    /// Home Assistant discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Module settings
    #[serde(default)]
    pub modules: ModulesConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_node_id() -> String {
    "hy01".to_string()
}

/// A Modbus TCP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModbusEndpointConfig {
    /// Host address (IP or hostname)
    pub host: String,

    /// TCP port (default: 502)
    #[serde(default = "default_modbus_port")]
    pub port: u16,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

/// Home Assistant discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Discovery topic prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Manufacturer shown on every device
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    /// Model shown on switch devices
    #[serde(default = "default_switch_model")]
    pub switch_model: String,

    /// Model shown on sensor devices
    #[serde(default = "default_sensor_model")]
    pub sensor_model: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            manufacturer: default_manufacturer(),
            switch_model: default_switch_model(),
            sensor_model: default_sensor_model(),
        }
    }
}

fn default_prefix() -> String {
    DISCOVERY_PREFIX.to_string()
}

fn default_manufacturer() -> String {
    "YourCompany".to_string()
}

fn default_switch_model() -> String {
    "Modbus Coil Controller".to_string()
}

fn default_sensor_model() -> String {
    "Modbus Temp/Humidity Sensor".to_string()
}

/// Per-module settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Coil switch module
    #[serde(default)]
    pub switch: SwitchModuleConfig,

    /// Temperature/humidity module
    #[serde(default)]
    pub temp: SensorModuleConfig,
}

/// Coil switch module settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchModuleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_switch_slave")]
    pub slave_id: u8,

    /// Number of coils exposed as switches
    #[serde(default = "default_coil_count")]
    pub coil_count: u16,

    /// Address of the coil exposed as index 0
    #[serde(default)]
    pub coil_base: u16,

    /// Private endpoint instead of the shared one
    #[serde(default)]
    pub modbus: Option<ModbusEndpointConfig>,
}

impl Default for SwitchModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slave_id: default_switch_slave(),
            coil_count: default_coil_count(),
            coil_base: 0,
            modbus: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_switch_slave() -> u8 {
    3
}

fn default_coil_count() -> u16 {
    8
}

/// Temperature/humidity module settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorModuleConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_sensor_slave")]
    pub slave_id: u8,

    /// Poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Holding register with humidity; temperature is the next one
    #[serde(default)]
    pub humidity_register: u16,

    /// Private endpoint instead of the shared one
    #[serde(default)]
    pub modbus: Option<ModbusEndpointConfig>,
}

impl Default for SensorModuleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            slave_id: default_sensor_slave(),
            poll_interval_secs: default_poll_interval(),
            humidity_register: 0,
            modbus: None,
        }
    }
}

fn default_sensor_slave() -> u8 {
    1
}

fn default_poll_interval() -> u64 {
    20
}

impl ModbusBridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ModbusBridgeConfig = json5::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn check(&self) -> Result<(), ConfigError> {
        validate_node_id(&self.node_id).map_err(|e| ConfigError::Validation(e.to_string()))?;

        self.mqtt
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        validate_endpoint("modbus", &self.modbus)?;

        let switch = &self.modules.switch;
        validate_slave("modules.switch", switch.slave_id)?;
        if switch.coil_count == 0 {
            return Err(ConfigError::Validation(
                "modules.switch.coil_count must be at least 1".to_string(),
            ));
        }
        if u32::from(switch.coil_base) + u32::from(switch.coil_count) > u32::from(u16::MAX) + 1 {
            return Err(ConfigError::Validation(format!(
                "modules.switch: coils {}..{} exceed the address space",
                switch.coil_base,
                u32::from(switch.coil_base) + u32::from(switch.coil_count)
            )));
        }
        if let Some(endpoint) = &switch.modbus {
            validate_endpoint("modules.switch.modbus", endpoint)?;
        }

        let temp = &self.modules.temp;
        validate_slave("modules.temp", temp.slave_id)?;
        if temp.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "modules.temp.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if temp.humidity_register == u16::MAX {
            return Err(ConfigError::Validation(
                "modules.temp.humidity_register leaves no room for the temperature register"
                    .to_string(),
            ));
        }
        if let Some(endpoint) = &temp.modbus {
            validate_endpoint("modules.temp.modbus", endpoint)?;
        }

        Ok(())
    }
}

fn validate_slave(module: &str, slave_id: u8) -> Result<(), ConfigError> {
    if !(1..=247).contains(&slave_id) {
        return Err(ConfigError::Validation(format!(
            "{}: slave_id must be 1-247 (got {})",
            module, slave_id
        )));
    }
    Ok(())
}

fn validate_endpoint(name: &str, endpoint: &ModbusEndpointConfig) -> Result<(), ConfigError> {
    if endpoint.host.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{}.host cannot be empty",
            name
        )));
    }
    Ok(())
}

impl BridgeConfig for ModbusBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn validate(&self) -> hassbridge_framework::Result<()> {
        self.check()
            .map_err(|e| BridgeError::validation(e.to_string()))
    }
}
