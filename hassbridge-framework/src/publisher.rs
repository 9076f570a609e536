//! Message publishing over MQTT.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

use hassbridge_common::DiscoveryRecord;

use crate::error::{BridgeError, Result};

/// The publish/subscribe side of a broker session, as seen by bridge modules.
///
/// Implemented by [`Publisher`] for a live broker and by in-memory fakes in tests.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload on a topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;

    /// Subscribe to a topic pattern (may contain `+` and `#`).
    async fn subscribe(&self, pattern: &str) -> Result<()>;

    /// Publish a retained text payload.
    async fn publish_retained(&self, topic: &str, payload: &str) -> Result<()> {
        self.publish(topic, payload.as_bytes().to_vec(), true).await
    }
}

/// Publisher for sending messages to the MQTT broker.
///
/// Wraps a `rumqttc` client handle. Requests are queued to the session's
/// network loop without waiting, so a publish returning `Ok` means the message
/// was handed to the client, not that the broker has it. While the broker link
/// is down, or the request queue is full, publishes fail immediately and the
/// message is dropped.
#[derive(Clone, Debug)]
pub struct Publisher {
    client: AsyncClient,
    qos: QoS,
    connected: Arc<AtomicBool>,
}

impl Publisher {
    /// Create a new publisher. It starts out disconnected.
    pub fn new(client: AsyncClient, qos: QoS) -> Self {
        Self {
            client,
            qos,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the broker link is up. Shared by every clone.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Get the QoS used for publishes and subscriptions.
    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Get a reference to the underlying client.
    pub fn client(&self) -> &AsyncClient {
        &self.client
    }
}

#[async_trait]
impl MessageBus for Publisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(BridgeError::Publish {
                topic: topic.to_string(),
                message: "not connected to broker".to_string(),
            });
        }

        self.client
            .try_publish(topic, self.qos, retain, payload)
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn subscribe(&self, pattern: &str) -> Result<()> {
        self.client
            .try_subscribe(pattern, self.qos)
            .map_err(|e| BridgeError::Subscribe {
                topic: pattern.to_string(),
                message: e.to_string(),
            })
    }
}

/// Publish a batch of discovery records, retained.
///
/// Returns the number of successfully published records and logs errors.
pub async fn publish_discovery<'a, I>(bus: &dyn MessageBus, records: I) -> PublishStats
where
    I: IntoIterator<Item = &'a DiscoveryRecord>,
{
    let mut stats = PublishStats::default();

    for record in records {
        match bus.publish(&record.topic, record.payload.clone(), true).await {
            Ok(()) => stats.success += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(topic = %record.topic, error = %e, "Failed to publish discovery");
            }
        }
    }

    stats
}

/// Statistics from a batch publish operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublishStats {
    /// Number of successfully published messages.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
}
