//! Temperature/humidity polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hassbridge_common::{DiscoveryBuilder, DiscoveryRecord, MqttConfig, SensorKind, TopicBuilder};
use hassbridge_framework::{
    BridgeError, Dispatcher, EventSource, MessageBus, MessageHandler, MqttSession,
    publish_discovery,
};

use crate::config::ModbusBridgeConfig;
use crate::connection::FieldBus;
use crate::error::ModbusError;

/// Registers read per cycle: humidity, then temperature.
const REGISTER_COUNT: u16 = 2;

/// One scaled reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub humidity: f64,
    pub temperature: f64,
}

impl Reading {
    /// Scale raw register values (tenths) to physical units.
    pub fn from_registers(registers: &[u16]) -> Result<Self, ModbusError> {
        match registers {
            [humidity, temperature, ..] => Ok(Self {
                humidity: scale(*humidity),
                temperature: scale(*temperature),
            }),
            _ => Err(ModbusError::ShortResponse {
                expected: REGISTER_COUNT as usize,
                actual: registers.len(),
            }),
        }
    }
}

/// Raw register value in tenths to a float.
pub fn scale(raw: u16) -> f64 {
    f64::from(raw) / 10.0
}

/// Payload text for a sensor value; always carries a fractional digit.
pub fn format_value(value: f64) -> String {
    format!("{:?}", value)
}

/// Polls one slave's humidity and temperature registers.
pub struct SensorModule {
    slave: u8,
    humidity_register: u16,
    poll_interval: Duration,
    model: String,
    topics: TopicBuilder,
    discovery: DiscoveryBuilder,
    field_bus: Arc<dyn FieldBus>,
}

impl SensorModule {
    pub fn new(config: &ModbusBridgeConfig, field_bus: Arc<dyn FieldBus>) -> Self {
        let temp = &config.modules.temp;
        Self {
            slave: temp.slave_id,
            humidity_register: temp.humidity_register,
            poll_interval: Duration::from_secs(temp.poll_interval_secs),
            model: config.discovery.sensor_model.clone(),
            topics: TopicBuilder::new(config.node_id.clone()),
            discovery: DiscoveryBuilder::new(
                config.discovery.prefix.clone(),
                config.node_id.clone(),
                config.discovery.manufacturer.clone(),
            ),
            field_bus,
        }
    }

    /// MQTT client id, stable across restarts.
    pub fn client_id(&self) -> String {
        format!("{}-temp-slave{}", self.topics.node_id(), self.slave)
    }

    pub fn discovery_records(&self) -> Vec<DiscoveryRecord> {
        SensorKind::ALL
            .into_iter()
            .filter_map(|kind| {
                self.discovery
                    .sensor_record(self.slave, kind, &self.model)
                    .inspect_err(|e| {
                        warn!(slave = self.slave, kind = %kind, error = %e, "Failed to build discovery")
                    })
                    .ok()
            })
            .collect()
    }

    /// Read both registers in one request.
    pub async fn read(&self) -> Result<Reading, ModbusError> {
        let registers = self
            .field_bus
            .read_holding_registers(self.slave, self.humidity_register, REGISTER_COUNT)
            .await?;
        Reading::from_registers(&registers)
    }

    /// One cycle: read, then publish humidity and temperature.
    ///
    /// On any read error nothing is published. Returns whether a reading was
    /// published.
    pub async fn poll(&self, bus: &dyn MessageBus) -> bool {
        let reading = match self.read().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!(
                    slave = self.slave,
                    register = self.humidity_register,
                    endpoint = %self.field_bus.endpoint(),
                    error = %e,
                    "Sensor read failed, skipping cycle"
                );
                return false;
            }
        };

        debug!(slave = self.slave, humidity = reading.humidity, temperature = reading.temperature, "Sensor read");

        for (kind, value) in [
            (SensorKind::Humidity, reading.humidity),
            (SensorKind::Temperature, reading.temperature),
        ] {
            let topic = self.topics.sensor_state(self.slave, kind);
            if let Err(e) = bus.publish_retained(&topic, &format_value(value)).await {
                warn!(topic = %topic, error = %e, "Failed to publish sensor value");
            }
        }

        true
    }

    /// Poll until shutdown, handling broker events between cycles.
    ///
    /// The first cycle runs immediately; each later one starts a full poll
    /// interval after the previous one finished.
    pub async fn run_loop<E>(
        &self,
        bus: &dyn MessageBus,
        events: &mut E,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), BridgeError>
    where
        E: EventSource + ?Sized,
    {
        let mut dispatcher = Dispatcher::new("temp");
        let next_poll = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(next_poll);

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                event = events.next_event() => match event {
                    Some(event) => dispatcher.dispatch(self, bus, event).await,
                    None => return Err(BridgeError::Mqtt("temp: network loop stopped".to_string())),
                },
                _ = &mut next_poll => {
                    self.poll(bus).await;
                    next_poll.as_mut().reset(Instant::now() + self.poll_interval);
                }
            }
        }
    }

    /// Run until shutdown with a dedicated MQTT session.
    pub async fn run(
        self,
        mqtt: &MqttConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BridgeError> {
        let mut session = MqttSession::connect(mqtt, self.client_id());
        let bus = session.publisher().clone();

        info!(
            slave = self.slave,
            interval_secs = self.poll_interval.as_secs(),
            "Sensor module running"
        );
        let result = self.run_loop(&bus, &mut session, &mut shutdown).await;

        session.close().await;
        result
    }
}

#[async_trait]
impl MessageHandler for SensorModule {
    async fn on_connect(&self, bus: &dyn MessageBus) -> hassbridge_framework::Result<()> {
        let stats = publish_discovery(bus, &self.discovery_records()).await;
        debug!(published = stats.success, failed = stats.failed, "Sensor discovery published");
        Ok(())
    }
}
