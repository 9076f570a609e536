//! MQTT bridge for Modbus TCP devices.
//!
//! This bridge exposes coils of a Modbus TCP device as Home Assistant
//! switches and holding registers as temperature/humidity sensors, with
//! entities registered through MQTT discovery.
//!
//! # Topics
//!
//! ```text
//! <node_id>/coil/<slave>/<index>/set       command, ON/OFF
//! <node_id>/coil/<slave>/<index>/state     retained state, ON/OFF
//! <node_id>/<slave>/<temperature|humidity>/state
//! homeassistant/<component>/.../config     retained discovery
//! ```
//!
//! Every module talks to the device through one shared [`ConnectionManager`],
//! which serializes requests and reconnects on demand.

pub mod config;
pub mod connection;
pub mod error;
pub mod sensor;
pub mod switch;
pub mod tcp;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use hassbridge_framework::BridgeRunner;
use tracing::info;

pub use config::{ModbusBridgeConfig, ModbusEndpointConfig};
pub use connection::{ConnectionManager, Connector, FieldBus, FieldBusSession};
pub use error::ModbusError;
pub use sensor::SensorModule;
pub use switch::SwitchModule;
pub use tcp::{TcpConnector, TcpSession};

/// Picks the field bus for a module: a private manager when the module has
/// its own endpoint, the shared one otherwise.
fn module_field_bus<F>(
    shared: &Arc<dyn FieldBus>,
    private: Option<&ModbusEndpointConfig>,
    connect_private: &F,
) -> (Arc<dyn FieldBus>, bool)
where
    F: Fn(&ModbusEndpointConfig) -> Arc<dyn FieldBus>,
{
    match private {
        Some(endpoint) => (connect_private(endpoint), true),
        None => (shared.clone(), false),
    }
}

/// Spawn every enabled module on `runner`.
///
/// Modules without their own endpoint share `shared`; a private endpoint gets
/// a private TCP [`ConnectionManager`] that is closed when its module exits.
/// Returns the number of modules spawned.
pub fn spawn_modules(
    runner: &mut BridgeRunner,
    config: &ModbusBridgeConfig,
    shared: Arc<dyn FieldBus>,
) -> usize {
    spawn_modules_with(runner, config, shared, |endpoint| {
        Arc::new(ConnectionManager::new(TcpConnector::from_config(endpoint)))
    })
}

/// [`spawn_modules`] with a custom factory for private field buses.
pub fn spawn_modules_with<F>(
    runner: &mut BridgeRunner,
    config: &ModbusBridgeConfig,
    shared: Arc<dyn FieldBus>,
    connect_private: F,
) -> usize
where
    F: Fn(&ModbusEndpointConfig) -> Arc<dyn FieldBus>,
{
    let mut spawned = 0;

    let switch = &config.modules.switch;
    if switch.enabled {
        let (field_bus, private) =
            module_field_bus(&shared, switch.modbus.as_ref(), &connect_private);
        let module = SwitchModule::new(config, field_bus.clone());
        let mqtt = config.mqtt.clone();

        runner.spawn_module("switch", move |shutdown| async move {
            let result = module.run(&mqtt, shutdown).await;
            if private {
                field_bus.close().await;
            }
            result
        });
        spawned += 1;
    } else {
        info!(module = "switch", "Module disabled");
    }

    let temp = &config.modules.temp;
    if temp.enabled {
        let (field_bus, private) = module_field_bus(&shared, temp.modbus.as_ref(), &connect_private);
        let module = SensorModule::new(config, field_bus.clone());
        let mqtt = config.mqtt.clone();

        runner.spawn_module("temp", move |shutdown| async move {
            let result = module.run(&mqtt, shutdown).await;
            if private {
                field_bus.close().await;
            }
            result
        });
        spawned += 1;
    } else {
        info!(module = "temp", "Module disabled");
    }

    spawned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedFieldBus;
    use std::sync::Mutex;

    fn config(switch: bool, temp: bool) -> ModbusBridgeConfig {
        let mut config: ModbusBridgeConfig = json5::from_str(
            r#"{
                mqtt: { host: "127.0.0.1", port: 1, reconnect_delay_ms: 10 },
                modbus: { host: "gateway" },
            }"#,
        )
        .unwrap();
        config.modules.switch.enabled = switch;
        config.modules.temp.enabled = temp;
        config
    }

    #[tokio::test]
    async fn test_disabled_modules_are_not_spawned() {
        let mut runner = BridgeRunner::new("test");
        let shared: Arc<dyn FieldBus> = Arc::new(ScriptedFieldBus::default());

        let spawned = spawn_modules(&mut runner, &config(false, false), shared);

        assert_eq!(spawned, 0);
        assert_eq!(runner.module_count(), 0);
    }

    #[tokio::test]
    async fn test_private_endpoint_gets_private_field_bus() {
        let mut config = config(true, true);
        config.modules.temp.modbus = Some(ModbusEndpointConfig {
            host: "sensor-gw".to_string(),
            port: 502,
            connect_timeout_ms: 3000,
        });

        let mut runner = BridgeRunner::new("test");
        let shared: Arc<dyn FieldBus> = Arc::new(ScriptedFieldBus::default());
        let requested = Mutex::new(Vec::new());

        let spawned = spawn_modules_with(&mut runner, &config, shared, |endpoint| {
            requested.lock().unwrap().push(endpoint.host.clone());
            Arc::new(ScriptedFieldBus::default())
        });

        assert_eq!(spawned, 2);
        assert_eq!(runner.module_count(), 2);
        assert_eq!(*requested.lock().unwrap(), vec!["sensor-gw".to_string()]);

        // Modules stop on shutdown even without a reachable broker
        runner.run_until(async {}).await.unwrap();
    }
}
