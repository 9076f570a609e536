//! In-memory message bus and field bus for module tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use hassbridge_framework::{BridgeError, MessageBus, Result};

use crate::connection::FieldBus;
use crate::error::ModbusError;

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Default)]
pub struct RecordingBus {
    pub published: Mutex<Vec<Published>>,
    pub subscriptions: Mutex<Vec<String>>,
}

impl RecordingBus {
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published().into_iter().map(|p| p.topic).collect()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        let payload = String::from_utf8(payload)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<()> {
        self.subscriptions.lock().unwrap().push(pattern.to_string());
        Ok(())
    }
}

/// Field bus answering reads from a script and recording writes.
#[derive(Default)]
pub struct ScriptedFieldBus {
    pub reads: Mutex<VecDeque<std::result::Result<Vec<u16>, ModbusError>>>,
    pub read_calls: Mutex<Vec<(u8, u16, u16)>>,
    pub writes: Mutex<Vec<(u8, u16, bool)>>,
    pub fail_writes: bool,
    /// Answer for reads once the script is exhausted.
    pub steady: Option<Vec<u16>>,
}

impl ScriptedFieldBus {
    pub fn with_reads(
        reads: impl IntoIterator<Item = std::result::Result<Vec<u16>, ModbusError>>,
    ) -> Self {
        Self {
            reads: Mutex::new(reads.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn steady(registers: Vec<u16>) -> Self {
        Self {
            steady: Some(registers),
            ..Default::default()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<(u8, u16, bool)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn read_calls(&self) -> Vec<(u8, u16, u16)> {
        self.read_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FieldBus for ScriptedFieldBus {
    fn endpoint(&self) -> &str {
        "scripted:502"
    }

    async fn write_coil(
        &self,
        slave: u8,
        address: u16,
        state: bool,
    ) -> std::result::Result<(), ModbusError> {
        if self.fail_writes {
            return Err(ModbusError::Transport("connection reset".to_string()));
        }
        self.writes.lock().unwrap().push((slave, address, state));
        Ok(())
    }

    async fn read_holding_registers(
        &self,
        slave: u8,
        address: u16,
        count: u16,
    ) -> std::result::Result<Vec<u16>, ModbusError> {
        self.read_calls.lock().unwrap().push((slave, address, count));
        self.reads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| match &self.steady {
                Some(registers) => Ok(registers.clone()),
                None => Err(ModbusError::Transport("script exhausted".to_string())),
            })
    }

    async fn close(&self) {}
}
