//! MQTT session with a background network loop and event dispatch.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use hassbridge_common::{MqttConfig, mqtt_options, qos};

use crate::error::{BridgeError, Result};
use crate::publisher::{MessageBus, Publisher};

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 10;

/// How long `close` waits for the network loop to flush the disconnect.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker events forwarded from the network loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The broker acknowledged a (re)connect.
    Connected,
    /// A message arrived on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// The connection failed or was lost; the loop retries after a delay.
    Disconnected(String),
}

/// A broker session owned by one module.
///
/// The `rumqttc` event loop runs on a dedicated driver task which forwards
/// [`BusEvent`]s over an unbounded channel, so the driver never waits on the
/// module while the module is publishing. Dropping the session aborts the
/// driver.
pub struct MqttSession {
    client_id: String,
    publisher: Publisher,
    events: mpsc::UnboundedReceiver<BusEvent>,
    driver: Option<JoinHandle<()>>,
}

impl MqttSession {
    /// Start a session. Connecting happens in the background; watch for
    /// [`BusEvent::Connected`].
    pub fn connect(config: &MqttConfig, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let options = mqtt_options(config, &client_id);
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::unbounded_channel();
        let publisher = Publisher::new(client, qos(config.qos));

        let driver = tokio::spawn(drive(
            eventloop,
            publisher.clone(),
            tx,
            Duration::from_millis(config.reconnect_delay_ms),
            client_id.clone(),
        ));

        tracing::info!(client_id = %client_id, host = %config.host, port = config.port, "MQTT session started");

        Self {
            client_id,
            publisher,
            events: rx,
            driver: Some(driver),
        }
    }

    /// Get the client id of this session.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the publisher for this session.
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Disconnect from the broker and join the network loop.
    pub async fn close(mut self) {
        if let Err(e) = self.publisher.client().try_disconnect() {
            tracing::debug!(client_id = %self.client_id, error = %e, "Disconnect request not queued");
        }

        if let Some(mut driver) = self.driver.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut driver).await.is_err() {
                tracing::debug!(client_id = %self.client_id, "Network loop did not stop, aborting");
                driver.abort();
            }
        }

        tracing::info!(client_id = %self.client_id, "MQTT session closed");
    }
}

#[async_trait]
impl EventSource for MqttSession {
    async fn next_event(&mut self) -> Option<BusEvent> {
        self.events.recv().await
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

async fn drive(
    mut eventloop: EventLoop,
    link: Publisher,
    events: mpsc::UnboundedSender<BusEvent>,
    reconnect_delay: Duration,
    client_id: String,
) {
    loop {
        let forwarded = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                link.set_connected(true);
                events.send(BusEvent::Connected)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => events.send(BusEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                link.set_connected(false);
                tracing::debug!(client_id = %client_id, "Disconnect sent, stopping network loop");
                break;
            }
            Ok(_) => Ok(()),
            Err(e) => {
                link.set_connected(false);
                tracing::warn!(client_id = %client_id, error = %e, "MQTT connection error");
                let sent = events.send(BusEvent::Disconnected(e.to_string()));
                tokio::time::sleep(reconnect_delay).await;
                sent
            }
        };

        if forwarded.is_err() {
            // Session dropped
            break;
        }
    }
}

/// A stream of broker events.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event. Returns `None` once the source has stopped.
    async fn next_event(&mut self) -> Option<BusEvent>;
}

#[async_trait]
impl EventSource for mpsc::UnboundedReceiver<BusEvent> {
    async fn next_event(&mut self) -> Option<BusEvent> {
        self.recv().await
    }
}

/// Callbacks a module implements to react to broker events.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Called after every successful (re)connect. Sessions are clean, so
    /// subscriptions and discovery must be renewed here.
    async fn on_connect(&self, bus: &dyn MessageBus) -> Result<()>;

    /// Called for every message on a subscribed topic.
    async fn on_message(&self, bus: &dyn MessageBus, topic: &str, payload: &[u8]) {
        let _ = (bus, topic, payload);
    }
}

/// Connection state of a module's broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No broker connection.
    Disconnected,
    /// Connected, subscriptions not yet in place.
    Connecting,
    /// Subscribed and ready for commands.
    Subscribed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Subscribed => write!(f, "subscribed"),
        }
    }
}

/// Routes [`BusEvent`]s to a [`MessageHandler`] and tracks the session state.
#[derive(Debug)]
pub struct Dispatcher {
    name: String,
    state: SessionState,
}

impl Dispatcher {
    /// Create a dispatcher for the named module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: SessionState::Disconnected,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::debug!(module = %self.name, from = %self.state, to = %next, "Session state changed");
            self.state = next;
        }
    }

    /// Handle one event.
    pub async fn dispatch<H>(&mut self, handler: &H, bus: &dyn MessageBus, event: BusEvent)
    where
        H: MessageHandler + ?Sized,
    {
        match event {
            BusEvent::Connected => {
                self.transition(SessionState::Connecting);
                match handler.on_connect(bus).await {
                    Ok(()) => {
                        self.transition(SessionState::Subscribed);
                        tracing::info!(module = %self.name, "Connected to broker");
                    }
                    Err(e) => {
                        tracing::error!(module = %self.name, error = %e, "Connect handler failed");
                    }
                }
            }
            BusEvent::Message { topic, payload } => {
                handler.on_message(bus, &topic, &payload).await;
            }
            BusEvent::Disconnected(reason) => {
                if self.state != SessionState::Disconnected {
                    tracing::warn!(module = %self.name, reason = %reason, "Disconnected from broker");
                }
                self.transition(SessionState::Disconnected);
            }
        }
    }
}

/// Dispatch events to `handler` until shutdown is signalled.
///
/// Fails only if the event source stops on its own.
pub async fn serve<H, E>(
    name: &str,
    handler: &H,
    bus: &dyn MessageBus,
    events: &mut E,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()>
where
    H: MessageHandler + ?Sized,
    E: EventSource + ?Sized,
{
    let mut dispatcher = Dispatcher::new(name);

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
                Some(event) => dispatcher.dispatch(handler, bus, event).await,
                None => return Err(BridgeError::Mqtt(format!("{}: network loop stopped", name))),
            }
        }
    }
}
