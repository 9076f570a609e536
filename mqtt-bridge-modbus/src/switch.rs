//! Coil switches: MQTT commands in, coil writes out, state mirrored back.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use hassbridge_common::{
    DiscoveryBuilder, DiscoveryRecord, MqttConfig, TopicBuilder, parse_coil_command,
    parse_switch_payload, switch_payload,
};
use hassbridge_framework::{
    BridgeError, MessageBus, MessageHandler, MqttSession, publish_discovery, serve,
};

use crate::config::ModbusBridgeConfig;
use crate::connection::FieldBus;
use crate::error::ModbusError;

/// Exposes `coil_count` coils of one slave as Home Assistant switches.
pub struct SwitchModule {
    slave: u8,
    coil_count: u16,
    coil_base: u16,
    model: String,
    topics: TopicBuilder,
    discovery: DiscoveryBuilder,
    field_bus: Arc<dyn FieldBus>,
}

impl SwitchModule {
    pub fn new(config: &ModbusBridgeConfig, field_bus: Arc<dyn FieldBus>) -> Self {
        let switch = &config.modules.switch;
        Self {
            slave: switch.slave_id,
            coil_count: switch.coil_count,
            coil_base: switch.coil_base,
            model: config.discovery.switch_model.clone(),
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
        format!("{}-switch-slave{}", self.topics.node_id(), self.slave)
    }

    /// Discovery records for every coil, in index order.
    pub fn discovery_records(&self) -> Vec<DiscoveryRecord> {
        (0..self.coil_count)
            .filter_map(|index| {
                self.discovery
                    .switch_record(self.slave, index, &self.model)
                    .inspect_err(|e| {
                        warn!(slave = self.slave, index, error = %e, "Failed to build discovery")
                    })
                    .ok()
            })
            .collect()
    }

    /// Write coil `index` and, only if that succeeds, publish the new state.
    pub async fn write(
        &self,
        bus: &dyn MessageBus,
        index: u16,
        state: bool,
    ) -> Result<(), ModbusError> {
        let address = match self.coil_base.checked_add(index) {
            Some(address) if index < self.coil_count => address,
            _ => {
                return Err(ModbusError::InvalidCoil {
                    index,
                    coil_count: self.coil_count,
                });
            }
        };

        if let Err(e) = self.field_bus.write_coil(self.slave, address, state).await {
            warn!(
                slave = self.slave,
                index,
                address,
                endpoint = %self.field_bus.endpoint(),
                error = %e,
                "Coil write failed"
            );
            return Err(e);
        }

        let topic = self.topics.coil_state(self.slave, index);
        let payload = switch_payload(state);
        debug!(slave = self.slave, index, state = payload, "Coil written");

        if let Err(e) = bus.publish_retained(&topic, payload).await {
            warn!(topic = %topic, error = %e, "Failed to publish coil state");
        }

        Ok(())
    }

    /// Handle one message from the command subscription.
    pub async fn handle_command(&self, bus: &dyn MessageBus, topic: &str, payload: &[u8]) {
        let command = match parse_coil_command(topic) {
            Ok(command) => command,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Dropping malformed command");
                return;
            }
        };

        if command.slave != self.slave {
            warn!(topic = %topic, slave = self.slave, "Dropping command for another slave");
            return;
        }
        if command.index >= self.coil_count {
            warn!(topic = %topic, coil_count = self.coil_count, "Dropping command for unknown coil");
            return;
        }

        let state = match parse_switch_payload(payload) {
            Ok(state) => state,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Dropping command with unreadable payload");
                return;
            }
        };

        info!(slave = self.slave, index = command.index, state, "Switch command");
        // Failures are logged by `write`
        let _ = self.write(bus, command.index, state).await;
    }

    /// Run until shutdown with a dedicated MQTT session.
    pub async fn run(
        self,
        mqtt: &MqttConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BridgeError> {
        let mut session = MqttSession::connect(mqtt, self.client_id());
        let bus = session.publisher().clone();

        info!(slave = self.slave, coils = self.coil_count, "Switch module running");
        let result = serve("switch", &self, &bus, &mut session, &mut shutdown).await;

        session.close().await;
        result
    }
}

#[async_trait]
impl MessageHandler for SwitchModule {
    async fn on_connect(&self, bus: &dyn MessageBus) -> hassbridge_framework::Result<()> {
        let pattern = self.topics.coil_command_wildcard(self.slave);
        bus.subscribe(&pattern).await?;
        info!(pattern = %pattern, "Subscribed to coil commands");

        let stats = publish_discovery(bus, &self.discovery_records()).await;
        debug!(published = stats.success, failed = stats.failed, "Switch discovery published");

        Ok(())
    }

    async fn on_message(&self, bus: &dyn MessageBus, topic: &str, payload: &[u8]) {
        self.handle_command(bus, topic, payload).await;
    }
}
