//! Transport layer for the acquisition path
//!
//! A transport is anything that yields an ordered stream of byte chunks.
//! The production implementation is a serial port; tests plug in scripted
//! sources through the same traits.

mod serial;

pub use serial::{
    list_ports, SerialConfig, SerialFlowControl, SerialOpener, SerialParity, SerialTransport,
};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default read buffer size for one acquisition read
pub const READ_BUFFER_SIZE: usize = 1024;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Port already in use
    #[error("Port already in use: {0}")]
    PortInUse(String),

    /// Opening the port failed for another reason
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Device went away mid-session
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A blocking byte stream.
///
/// `read_chunk` blocks until at least one byte is available, the device
/// fails, or `cancel` fires. It returns `Ok(0)` only when cancelled.
pub trait ByteSource: Send {
    /// Read the next chunk into `buf`
    fn read_chunk(
        &mut self,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<usize, TransportError>;

    /// Human-readable description (port name, baud rate)
    fn describe(&self) -> String;
}

/// Opens a transport for a resolved device
pub trait TransportOpener {
    /// Open the device described by `config`
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn ByteSource>, TransportError>;
}

impl<F> TransportOpener for F
where
    F: Fn(&SerialConfig) -> Result<Box<dyn ByteSource>, TransportError>,
{
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn ByteSource>, TransportError> {
        self(config)
    }
}
