//! Shared, self-healing access to one Modbus endpoint.
//!
//! A [`ConnectionManager`] owns at most one live session. Every operation
//! locks it, checks the session is still usable, reconnects once if not, and
//! performs the request while still holding the lock, so concurrent modules
//! never interleave frames on the wire.

use async_trait::async_trait;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::ModbusError;

/// An established field bus session.
#[async_trait]
pub trait FieldBusSession: Send {
    /// Whether the session can still carry requests.
    fn is_connected(&self) -> bool;

    /// Write a single coil (function code 0x05).
    async fn write_single_coil(
        &mut self,
        slave: u8,
        address: u16,
        state: bool,
    ) -> Result<(), ModbusError>;

    /// Read holding registers (function code 0x03).
    async fn read_holding_registers(
        &mut self,
        slave: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;

    /// Release the underlying socket.
    async fn close(&mut self);
}

/// Creates sessions to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: FieldBusSession + 'static;

    /// Make one connection attempt.
    async fn connect(&self) -> Result<Self::Session, ModbusError>;

    /// Endpoint description for logs, e.g. `10.0.0.3:502`.
    fn endpoint(&self) -> &str;
}

/// Field bus operations as seen by the modules.
#[async_trait]
pub trait FieldBus: Send + Sync {
    /// Endpoint description for logs.
    fn endpoint(&self) -> &str;

    /// Write one coil on `slave`.
    async fn write_coil(&self, slave: u8, address: u16, state: bool) -> Result<(), ModbusError>;

    /// Read `count` holding registers on `slave`.
    async fn read_holding_registers(
        &self,
        slave: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;

    /// Close the connection. Idempotent.
    async fn close(&self);
}

/// The single owner of a Modbus session, shared between modules.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    session: Mutex<Option<C::Session>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager. No connection is made until [`connect`](Self::connect)
    /// or the first operation.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            session: Mutex::new(None),
        }
    }

    /// Endpoint of the managed connection.
    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    /// Connect eagerly at startup.
    ///
    /// Failure is logged and returned as `false`; the next operation retries.
    pub async fn connect(&self) -> bool {
        match self.acquire().await {
            Ok(_) => true,
            Err(e) => {
                warn!(endpoint = %self.endpoint(), error = %e, "Initial Modbus connect failed, will retry on demand");
                false
            }
        }
    }

    /// Get exclusive access to a connected session.
    ///
    /// If there is no session, or the current one reports it is no longer
    /// connected, the stale one is closed and exactly one fresh connect is
    /// attempted. Other callers wait on the lock meanwhile.
    pub async fn acquire(&self) -> Result<MappedMutexGuard<'_, C::Session>, ModbusError> {
        let mut guard = self.session.lock().await;

        let live = guard.as_ref().is_some_and(|session| session.is_connected());
        if !live {
            if let Some(mut stale) = guard.take() {
                debug!(endpoint = %self.endpoint(), "Closing stale Modbus session");
                stale.close().await;
            }

            match self.connector.connect().await {
                Ok(session) => {
                    info!(endpoint = %self.endpoint(), "Connected to Modbus device");
                    *guard = Some(session);
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint(), error = %e, "Modbus connect failed");
                    return Err(ModbusError::Unavailable {
                        endpoint: self.endpoint().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        MutexGuard::try_map(guard, |session| session.as_mut()).map_err(|_| {
            ModbusError::Unavailable {
                endpoint: self.endpoint().to_string(),
                message: "no session".to_string(),
            }
        })
    }

    /// Whether a live session is currently held.
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|session| session.is_connected())
    }

    /// Close the session if there is one. Idempotent.
    pub async fn close(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            session.close().await;
            info!(endpoint = %self.endpoint(), "Modbus connection closed");
        }
    }
}

#[async_trait]
impl<C: Connector> FieldBus for ConnectionManager<C> {
    fn endpoint(&self) -> &str {
        ConnectionManager::endpoint(self)
    }

    async fn write_coil(&self, slave: u8, address: u16, state: bool) -> Result<(), ModbusError> {
        let mut session = self.acquire().await?;
        session.write_single_coil(slave, address, state).await
    }

    async fn read_holding_registers(
        &self,
        slave: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        let mut session = self.acquire().await?;
        session.read_holding_registers(slave, address, count).await
    }

    async fn close(&self) {
        ConnectionManager::close(self).await
    }
}
