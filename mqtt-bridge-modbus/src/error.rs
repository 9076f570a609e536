//! Field bus errors.

use thiserror::Error;

/// Errors from a Modbus operation.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// No session could be established.
    #[error("Modbus device {endpoint} unavailable: {message}")]
    Unavailable { endpoint: String, message: String },

    /// Connecting took longer than the configured timeout.
    #[error("Connection to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// I/O or framing failure on an established session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The device answered with an exception response.
    #[error("Slave {slave} returned exception: {code}")]
    Exception { slave: u8, code: String },

    /// A coil index outside the configured range.
    #[error("Coil index {index} out of range (coil_count {coil_count})")]
    InvalidCoil { index: u16, coil_count: u16 },

    /// Fewer values came back than were requested.
    #[error("Short response: expected {expected} values, got {actual}")]
    ShortResponse { expected: usize, actual: usize },
}
