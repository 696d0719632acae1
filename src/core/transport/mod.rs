//! Byte sources feeding the frame decoder
//!
//! Supports:
//! - Serial ports (RS-232, USB-Serial)
//! - Captured streams replayed from any reader (files, stdin)

mod reader;
mod serial;

pub use reader::ReaderSource;
pub use serial::{list_ports, SerialConfig, SerialFlowControl, SerialParity, SerialSource};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Source closed or reached end of stream
    #[error("Disconnected")]
    Disconnected,
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Bytes received
    pub bytes_received: u64,
    /// Reads that returned data
    pub reads: u64,
    /// Errors count
    pub errors: u64,
    /// Connection uptime in seconds
    pub uptime_secs: u64,
}

/// A source of raw bytes.
///
/// `read_available` returns whatever has arrived, possibly nothing. It must
/// not block the runtime thread; readers that wait for input do so on the
/// blocking pool. `Disconnected` ends the stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ByteSource: Send {
    /// Read the bytes available right now
    async fn read_available(&mut self) -> Result<Bytes, TransportError>;

    /// Get connection info string
    fn describe(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}
