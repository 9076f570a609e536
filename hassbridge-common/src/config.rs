//! Broker and logging configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Common MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or IP address.
    pub host: String,

    /// Broker TCP port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Username, passed through to the broker as-is.
    #[serde(default)]
    pub username: Option<String>,

    /// Password, passed through to the broker as-is.
    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// QoS used for publish and subscribe (0, 1 or 2).
    #[serde(default)]
    pub qos: u8,

    /// Delay before the network loop retries after a broker error.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

fn default_reconnect_delay() -> u64 {
    1000
}

impl MqttConfig {
    /// Create a configuration for `host` with every other field defaulted.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            qos: 0,
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }

    /// Check the fields that serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("mqtt.host cannot be empty".to_string()));
        }
        if self.qos > 2 {
            return Err(Error::Config(format!(
                "mqtt.qos must be 0, 1 or 2 (got {})",
                self.qos
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(Error::Config(
                "mqtt.username and mqtt.password must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
