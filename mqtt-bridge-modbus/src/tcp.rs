//! Modbus TCP transport built on `tokio-modbus`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_modbus::client::{Context, Reader, Writer};
use tokio_modbus::prelude::*;
use tracing::debug;

use crate::config::ModbusEndpointConfig;
use crate::connection::{Connector, FieldBusSession};
use crate::error::ModbusError;

/// Connects to a Modbus TCP gateway.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    timeout: Duration,
    endpoint: String,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        let host = host.into();
        let endpoint = format!("{}:{}", host, port);
        Self {
            host,
            port,
            timeout,
            endpoint,
        }
    }

    pub fn from_config(config: &ModbusEndpointConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.port,
            Duration::from_millis(config.connect_timeout_ms),
        )
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Session = TcpSession;

    async fn connect(&self) -> Result<TcpSession, ModbusError> {
        let stream = tokio::time::timeout(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| ModbusError::Timeout {
            endpoint: self.endpoint.clone(),
        })?
        .map_err(|e| ModbusError::Transport(e.to_string()))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(endpoint = %self.endpoint, error = %e, "Failed to set TCP_NODELAY");
        }

        Ok(TcpSession {
            ctx: tcp::attach(stream),
            connected: true,
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// A Modbus TCP session.
///
/// Any I/O or framing error marks the session disconnected so the manager
/// replaces it; exception responses leave it usable.
pub struct TcpSession {
    ctx: Context,
    connected: bool,
}

impl TcpSession {
    fn check<T>(&mut self, slave: u8, result: tokio_modbus::Result<T>) -> Result<T, ModbusError> {
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(code)) => Err(ModbusError::Exception {
                slave,
                code: format!("{:?}", code),
            }),
            Err(e) => {
                self.connected = false;
                Err(ModbusError::Transport(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl FieldBusSession for TcpSession {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn write_single_coil(
        &mut self,
        slave: u8,
        address: u16,
        state: bool,
    ) -> Result<(), ModbusError> {
        self.ctx.set_slave(Slave(slave));
        let result = self.ctx.write_single_coil(address, state).await;
        self.check(slave, result)
    }

    async fn read_holding_registers(
        &mut self,
        slave: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        self.ctx.set_slave(Slave(slave));
        let result = self.ctx.read_holding_registers(address, count).await;
        self.check(slave, result)
    }

    async fn close(&mut self) {
        self.connected = false;
        if let Err(e) = self.ctx.disconnect().await {
            debug!(error = %e, "Error closing Modbus connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionManager, FieldBus};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_endpoint_format() {
        let connector = TcpConnector::new("10.0.0.3", 502, Duration::from_secs(3));
        assert_eq!(connector.endpoint(), "10.0.0.3:502");
    }

    #[tokio::test]
    async fn test_refused_connect_is_unavailable() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let manager = ConnectionManager::new(TcpConnector::new(
            "127.0.0.1",
            port,
            Duration::from_secs(1),
        ));

        let err = manager.write_coil(3, 0, true).await.unwrap_err();
        assert!(matches!(err, ModbusError::Unavailable { .. }));
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_write_coil_against_fake_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Echo one write-single-coil request back, which is the normal response
        let gateway = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frame = [0u8; 12];
            socket.read_exact(&mut frame).await.unwrap();
            socket.write_all(&frame).await.unwrap();
            frame
        });

        let manager = ConnectionManager::new(TcpConnector::new(
            "127.0.0.1",
            port,
            Duration::from_secs(1),
        ));
        manager.write_coil(3, 2, true).await.unwrap();

        let frame = gateway.await.unwrap();
        // MBAP length 6, unit id, function 0x05, address 2, value 0xFF00
        assert_eq!(&frame[4..], &[0x00, 0x06, 0x03, 0x05, 0x00, 0x02, 0xFF, 0x00]);
        manager.close().await;
    }
}
