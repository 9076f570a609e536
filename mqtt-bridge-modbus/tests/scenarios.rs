//! End-to-end module behavior through a real connection manager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hassbridge_framework::{MessageBus, MessageHandler, Result as BridgeResult};
use mqtt_bridge_modbus::{
    ConnectionManager, Connector, FieldBus, FieldBusSession, ModbusBridgeConfig, ModbusError,
    SensorModule, SwitchModule,
};

/// A simulated device shared by every session the connector opens.
#[derive(Default)]
struct Device {
    coils: Mutex<Vec<(u8, u16, bool)>>,
    registers: Mutex<Vec<u16>>,
    /// Number of upcoming register reads that fail with a transport error.
    failing_reads: AtomicUsize,
}

struct DeviceConnector {
    device: Arc<Device>,
    connects: AtomicUsize,
}

struct DeviceSession {
    device: Arc<Device>,
    connected: bool,
}

#[async_trait]
impl FieldBusSession for DeviceSession {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn write_single_coil(
        &mut self,
        slave: u8,
        address: u16,
        state: bool,
    ) -> Result<(), ModbusError> {
        self.device.coils.lock().unwrap().push((slave, address, state));
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        _slave: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        let failing = &self.device.failing_reads;
        if failing.load(Ordering::SeqCst) > 0 {
            failing.fetch_sub(1, Ordering::SeqCst);
            self.connected = false;
            return Err(ModbusError::Transport("connection reset by peer".to_string()));
        }

        let registers = self.device.registers.lock().unwrap();
        let start = address as usize;
        Ok(registers[start..start + count as usize].to_vec())
    }

    async fn close(&mut self) {
        self.connected = false;
    }
}

#[async_trait]
impl Connector for DeviceConnector {
    type Session = DeviceSession;

    async fn connect(&self) -> Result<DeviceSession, ModbusError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceSession {
            device: self.device.clone(),
            connected: true,
        })
    }

    fn endpoint(&self) -> &str {
        "device:502"
    }
}

#[derive(Default)]
struct RecordingBus {
    published: Mutex<Vec<(String, String, bool)>>,
}

impl RecordingBus {
    fn published(&self) -> Vec<(String, String, bool)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> BridgeResult<()> {
        self.published.lock().unwrap().push((
            topic.to_string(),
            String::from_utf8_lossy(&payload).into_owned(),
            retain,
        ));
        Ok(())
    }

    async fn subscribe(&self, _pattern: &str) -> BridgeResult<()> {
        Ok(())
    }
}

fn config() -> ModbusBridgeConfig {
    json5::from_str(
        r#"{
            node_id: "hy01",
            mqtt: { host: "broker" },
            modbus: { host: "gateway" },
            modules: {
                switch: { slave_id: 3, coil_count: 8 },
                temp: { enabled: true, slave_id: 1, humidity_register: 0 },
            },
        }"#,
    )
    .expect("config parses")
}

fn manager(device: &Arc<Device>) -> Arc<ConnectionManager<DeviceConnector>> {
    Arc::new(ConnectionManager::new(DeviceConnector {
        device: device.clone(),
        connects: AtomicUsize::new(0),
    }))
}

#[tokio::test]
async fn test_switch_command_reaches_device_and_state_is_retained() {
    let device = Arc::new(Device::default());
    let manager = manager(&device);
    let module = SwitchModule::new(&config(), manager.clone());
    let bus = RecordingBus::default();

    module.on_message(&bus, "hy01/coil/3/2/set", b"ON").await;

    assert_eq!(*device.coils.lock().unwrap(), vec![(3, 2, true)]);
    assert_eq!(
        bus.published(),
        vec![("hy01/coil/3/2/state".to_string(), "ON".to_string(), true)]
    );
}

#[tokio::test]
async fn test_sensor_poll_publishes_scaled_values_in_order() {
    let device = Arc::new(Device::default());
    *device.registers.lock().unwrap() = vec![635, 298];
    let module = SensorModule::new(&config(), manager(&device));
    let bus = RecordingBus::default();

    assert!(module.poll(&bus).await);

    assert_eq!(
        bus.published(),
        vec![
            ("hy01/1/humidity/state".to_string(), "63.5".to_string(), true),
            ("hy01/1/temperature/state".to_string(), "29.8".to_string(), true),
        ]
    );
}

#[tokio::test]
async fn test_transport_error_skips_cycle_and_next_cycle_reconnects() {
    let device = Arc::new(Device::default());
    *device.registers.lock().unwrap() = vec![500, 215];
    device.failing_reads.store(1, Ordering::SeqCst);

    let manager = manager(&device);
    let module = SensorModule::new(&config(), manager.clone());
    let bus = RecordingBus::default();

    assert!(!module.poll(&bus).await);
    assert!(bus.published().is_empty());
    assert!(!manager.is_connected().await);

    assert!(module.poll(&bus).await);
    assert_eq!(bus.published().len(), 2);
    assert_eq!(bus.published()[1].1, "21.5");
}

#[tokio::test]
async fn test_modules_share_one_connection() {
    let device = Arc::new(Device::default());
    *device.registers.lock().unwrap() = vec![400, 220];

    let manager = manager(&device);
    let shared: Arc<dyn FieldBus> = manager.clone();
    let switch = SwitchModule::new(&config(), shared.clone());
    let sensor = SensorModule::new(&config(), shared);
    let bus = RecordingBus::default();

    let (_, polled) = tokio::join!(
        switch.write(&bus, 0, false),
        sensor.poll(&bus),
    );
    assert!(polled);

    assert!(manager.is_connected().await);
    assert_eq!(*device.coils.lock().unwrap(), vec![(3, 0, false)]);
    manager.close().await;
    assert!(!manager.is_connected().await);
}
