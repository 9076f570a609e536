//! Home Assistant MQTT discovery documents.
//!
//! Every entity the bridge exposes is announced with one retained config
//! document. Documents are pure functions of node id, slave id and entity, and
//! serialize to the same bytes for the same inputs, so they can be republished
//! on every broker connect without diffing.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::topics::{PAYLOAD_OFF, PAYLOAD_ON, TopicBuilder, discovery_topic};

/// Discovery component for coils.
pub const SWITCH_COMPONENT: &str = "switch";

/// Discovery component for sensor readings.
pub const SENSOR_COMPONENT: &str = "sensor";

/// Physical quantity measured by a sensor module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
}

impl SensorKind {
    /// All kinds, in discovery announcement order.
    pub const ALL: [SensorKind; 2] = [SensorKind::Temperature, SensorKind::Humidity];

    /// Topic segment and device class.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "Temperature",
            SensorKind::Humidity => "Humidity",
        }
    }

    /// Unit of measurement.
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device block shared by all entities of one slave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
}

/// Discovery document for a coil exposed as a switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchDiscovery {
    pub name: String,
    pub command_topic: String,
    pub state_topic: String,
    pub payload_on: String,
    pub payload_off: String,
    pub unique_id: String,
    pub object_id: String,
    pub device: DeviceInfo,
}

/// Discovery document for a scaled register reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDiscovery {
    pub name: String,
    pub state_topic: String,
    pub unit_of_measurement: String,
    pub device_class: String,
    pub unique_id: String,
    pub object_id: String,
    pub device: DeviceInfo,
}

/// A serialized discovery document and the topic it is retained on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Builds discovery records for one node.
#[derive(Debug, Clone)]
pub struct DiscoveryBuilder {
    prefix: String,
    manufacturer: String,
    topics: TopicBuilder,
}

impl DiscoveryBuilder {
    pub fn new(
        prefix: impl Into<String>,
        node_id: impl Into<String>,
        manufacturer: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            manufacturer: manufacturer.into(),
            topics: TopicBuilder::new(node_id),
        }
    }

    fn node_id(&self) -> &str {
        self.topics.node_id()
    }

    /// Device block for a slave, e.g. `hy01_slave3`.
    pub fn device(&self, slave: u8, model: &str) -> DeviceInfo {
        let name = format!("{}_slave{}", self.node_id(), slave);
        DeviceInfo {
            identifiers: vec![name.clone()],
            name,
            model: model.to_string(),
            manufacturer: self.manufacturer.clone(),
        }
    }

    /// Switch document for coil `index` of `slave`.
    pub fn switch(&self, slave: u8, index: u16, model: &str) -> SwitchDiscovery {
        let object_id = format!("{}_slave{}_coil{}", self.node_id(), slave, index);
        SwitchDiscovery {
            name: object_id.clone(),
            command_topic: self.topics.coil_command(slave, index),
            state_topic: self.topics.coil_state(slave, index),
            payload_on: PAYLOAD_ON.to_string(),
            payload_off: PAYLOAD_OFF.to_string(),
            unique_id: object_id.clone(),
            object_id,
            device: self.device(slave, model),
        }
    }

    /// Sensor document for one reading of `slave`.
    pub fn sensor(&self, slave: u8, kind: SensorKind, model: &str) -> SensorDiscovery {
        let object_id = format!("{}_slave{}_{}", self.node_id(), slave, kind.as_str());
        SensorDiscovery {
            name: format!("{} Slave {} {}", self.node_id(), slave, kind.label()),
            state_topic: self.topics.sensor_state(slave, kind),
            unit_of_measurement: kind.unit().to_string(),
            device_class: kind.as_str().to_string(),
            unique_id: object_id.clone(),
            object_id,
            device: self.device(slave, model),
        }
    }

    /// Serialized switch record, retained at `<prefix>/switch/<object_id>/config`.
    pub fn switch_record(&self, slave: u8, index: u16, model: &str) -> Result<DiscoveryRecord> {
        let doc = self.switch(slave, index, model);
        Ok(DiscoveryRecord {
            topic: discovery_topic(&self.prefix, SWITCH_COMPONENT, None, &doc.object_id),
            payload: serde_json::to_vec(&doc)?,
        })
    }

    /// Serialized sensor record, retained at
    /// `<prefix>/sensor/<node_id>/<object_id>/config`.
    pub fn sensor_record(&self, slave: u8, kind: SensorKind, model: &str) -> Result<DiscoveryRecord> {
        let doc = self.sensor(slave, kind, model);
        Ok(DiscoveryRecord {
            topic: discovery_topic(
                &self.prefix,
                SENSOR_COMPONENT,
                Some(self.node_id()),
                &doc.object_id,
            ),
            payload: serde_json::to_vec(&doc)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::DISCOVERY_PREFIX;

    fn builder() -> DiscoveryBuilder {
        DiscoveryBuilder::new(DISCOVERY_PREFIX, "hy01", "YourCompany")
    }

    #[test]
    fn test_switch_document() {
        let doc = builder().switch(3, 2, "Modbus Coil Controller");

        assert_eq!(doc.name, "hy01_slave3_coil2");
        assert_eq!(doc.command_topic, "hy01/coil/3/2/set");
        assert_eq!(doc.state_topic, "hy01/coil/3/2/state");
        assert_eq!(doc.payload_on, "ON");
        assert_eq!(doc.payload_off, "OFF");
        assert_eq!(doc.unique_id, "hy01_slave3_coil2");
        assert_eq!(doc.device.identifiers, vec!["hy01_slave3"]);
        assert_eq!(doc.device.model, "Modbus Coil Controller");
    }

    #[test]
    fn test_sensor_document() {
        let doc = builder().sensor(1, SensorKind::Temperature, "Modbus Temp/Humidity Sensor");

        assert_eq!(doc.name, "hy01 Slave 1 Temperature");
        assert_eq!(doc.state_topic, "hy01/1/temperature/state");
        assert_eq!(doc.unit_of_measurement, "°C");
        assert_eq!(doc.device_class, "temperature");
        assert_eq!(doc.object_id, "hy01_slave1_temperature");
        assert_eq!(doc.device.name, "hy01_slave1");
    }

    #[test]
    fn test_record_topics() {
        let switch = builder().switch_record(3, 0, "m").unwrap();
        assert_eq!(switch.topic, "homeassistant/switch/hy01_slave3_coil0/config");

        let sensor = builder().sensor_record(1, SensorKind::Humidity, "m").unwrap();
        assert_eq!(
            sensor.topic,
            "homeassistant/sensor/hy01/hy01_slave1_humidity/config"
        );
    }

    #[test]
    fn test_switch_payload_field_order() {
        let record = builder().switch_record(3, 0, "Modbus Coil Controller").unwrap();
        let json = String::from_utf8(record.payload).unwrap();

        assert!(json.starts_with(r#"{"name":"hy01_slave3_coil0","command_topic":"hy01/coil/3/0/set","#));
        assert!(json.ends_with(
            r#""device":{"identifiers":["hy01_slave3"],"name":"hy01_slave3","model":"Modbus Coil Controller","manufacturer":"YourCompany"}}"#
        ));
    }

    #[test]
    fn test_records_are_deterministic() {
        let a = builder().switch_record(3, 5, "m").unwrap();
        let b = builder().switch_record(3, 5, "m").unwrap();
        assert_eq!(a, b);

        let a = builder().sensor_record(2, SensorKind::Temperature, "m").unwrap();
        let b = builder().sensor_record(2, SensorKind::Temperature, "m").unwrap();
        assert_eq!(a.payload, b.payload);
    }

    #[test]
    fn test_sensor_kind_strings() {
        assert_eq!(SensorKind::Humidity.as_str(), "humidity");
        assert_eq!(SensorKind::Humidity.unit(), "%");
        assert_eq!(SensorKind::Temperature.to_string(), "temperature");
    }
}
