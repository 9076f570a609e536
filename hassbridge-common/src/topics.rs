//! Node-scoped MQTT topics and command parsing.

use crate::discovery::SensorKind;
use crate::error::{Error, Result};

/// Default Home Assistant discovery prefix.
pub const DISCOVERY_PREFIX: &str = "homeassistant";

/// Payload for a switched-on coil.
pub const PAYLOAD_ON: &str = "ON";

/// Payload for a switched-off coil.
pub const PAYLOAD_OFF: &str = "OFF";

/// Builder for the node-scoped MQTT topics of one gateway.
///
/// Topics follow the patterns:
/// - `<node_id>/coil/<slave>/<index>/set` (commands)
/// - `<node_id>/coil/<slave>/<index>/state` (coil state)
/// - `<node_id>/<slave>/<temperature|humidity>/state` (sensor state)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    node_id: String,
}

impl TopicBuilder {
    /// Create a builder for a node id.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }

    /// The node id used as topic prefix.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Command topic for a coil.
    ///
    /// # Example
    /// ```
    /// use hassbridge_common::topics::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("hy01");
    /// assert_eq!(topics.coil_command(3, 0), "hy01/coil/3/0/set");
    /// ```
    pub fn coil_command(&self, slave: u8, index: u16) -> String {
        format!("{}/coil/{}/{}/set", self.node_id, slave, index)
    }

    /// State topic for a coil.
    ///
    /// # Example
    /// ```
    /// use hassbridge_common::topics::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("hy01");
    /// assert_eq!(topics.coil_state(3, 2), "hy01/coil/3/2/state");
    /// ```
    pub fn coil_state(&self, slave: u8, index: u16) -> String {
        format!("{}/coil/{}/{}/state", self.node_id, slave, index)
    }

    /// Wildcard matching every coil command topic of one slave.
    ///
    /// # Example
    /// ```
    /// use hassbridge_common::topics::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("hy01");
    /// assert_eq!(topics.coil_command_wildcard(3), "hy01/coil/3/+/set");
    /// ```
    pub fn coil_command_wildcard(&self, slave: u8) -> String {
        format!("{}/coil/{}/+/set", self.node_id, slave)
    }

    /// State topic for a sensor reading.
    ///
    /// # Example
    /// ```
    /// use hassbridge_common::discovery::SensorKind;
    /// use hassbridge_common::topics::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("hy01");
    /// assert_eq!(
    ///     topics.sensor_state(1, SensorKind::Humidity),
    ///     "hy01/1/humidity/state"
    /// );
    /// ```
    pub fn sensor_state(&self, slave: u8, kind: SensorKind) -> String {
        format!("{}/{}/{}/state", self.node_id, slave, kind.as_str())
    }
}

/// Build a discovery config topic.
///
/// Produces `<prefix>/<component>/<object_id>/config`, or
/// `<prefix>/<component>/<node_id>/<object_id>/config` when a node id is given.
pub fn discovery_topic(
    prefix: &str,
    component: &str,
    node_id: Option<&str>,
    object_id: &str,
) -> String {
    match node_id {
        Some(node_id) => format!("{}/{}/{}/{}/config", prefix, component, node_id, object_id),
        None => format!("{}/{}/{}/config", prefix, component, object_id),
    }
}

/// A coil addressed by a command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoilCommand {
    pub slave: u8,
    pub index: u16,
}

/// Parse a coil command topic (`<node_id>/coil/<slave>/<index>/set`).
///
/// Slave and index are read from fixed positions; any other shape is rejected.
pub fn parse_coil_command(topic: &str) -> Result<CoilCommand> {
    let parts: Vec<&str> = topic.split('/').collect();

    if parts.len() != 5 || parts[1] != "coil" || parts[4] != "set" {
        return Err(Error::topic(
            topic,
            "expected <node_id>/coil/<slave>/<index>/set",
        ));
    }

    let slave = parts[2]
        .parse::<u8>()
        .map_err(|e| Error::topic(topic, format!("bad slave id '{}': {}", parts[2], e)))?;
    let index = parts[3]
        .parse::<u16>()
        .map_err(|e| Error::topic(topic, format!("bad coil index '{}': {}", parts[3], e)))?;

    Ok(CoilCommand { slave, index })
}

/// Decode a switch command payload.
///
/// `"ON"` in any letter case means on; any other text means off.
pub fn parse_switch_payload(payload: &[u8]) -> Result<bool> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| Error::Payload(format!("switch payload is not UTF-8: {}", e)))?;
    Ok(text.eq_ignore_ascii_case(PAYLOAD_ON))
}

/// Encode a coil state as a switch payload.
pub fn switch_payload(state: bool) -> &'static str {
    if state { PAYLOAD_ON } else { PAYLOAD_OFF }
}
