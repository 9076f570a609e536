//! MQTT bridge for Modbus TCP devices.
//!
//! Exposes coils and holding registers of a Modbus TCP device to Home
//! Assistant over MQTT.

use std::sync::Arc;

use anyhow::{Context, Result};
use hassbridge_framework::{BridgeArgs, BridgeRunner};
use mqtt_bridge_modbus::{ConnectionManager, ModbusBridgeConfig, TcpConnector, spawn_modules};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("modbus-mqtt.json5");

    // Load configuration
    let config = ModbusBridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let mut runner = BridgeRunner::init("mqtt-bridge-modbus", &config, Some(&args))
        .context("Failed to initialize bridge")?;
    info!("Loaded configuration from {:?}", args.config);

    // Shared Modbus connection; a failed first connect is retried on demand
    let shared = Arc::new(ConnectionManager::new(TcpConnector::from_config(
        &config.modbus,
    )));
    shared.connect().await;

    let spawned = spawn_modules(&mut runner, &config, shared.clone());
    if spawned == 0 {
        warn!("All modules are disabled");
    }

    runner.run().await.context("Bridge failed")?;

    shared.close().await;
    info!("Modbus bridge stopped");

    Ok(())
}
