//! Serial port transport implementation

use super::{ByteSource, TransportError, TransportOpener};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How long a single port read may block before cancellation is re-checked
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
}

impl SerialConfig {
    /// Create a new serial configuration with 8N1 and no flow control
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
        }
    }

    /// Set data bits
    #[must_use]
    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    /// Set stop bits
    #[must_use]
    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Set flow control
    #[must_use]
    pub fn flow_control(mut self, flow: SerialFlowControl) -> Self {
        self.flow_control = flow;
        self
    }

    /// Short description, e.g. `/dev/ttyUSB0 @ 115200 baud (8N1)`
    pub fn summary(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            self.port,
            self.baud_rate,
            self.data_bits,
            match self.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.stop_bits,
        )
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("COM1", 115_200)
    }
}

/// Serial port transport
pub struct SerialTransport {
    config: SerialConfig,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open and configure the port
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        let data_bits = match config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };

        let stop_bits = match config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let parity = match config.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let flow_control = match config.flow_control {
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::None => FlowControl::None,
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| map_open_error(&config.port, e))?;

        info!(port = %config.port, baud = config.baud_rate, "Serial port opened");

        Ok(Self { config, port })
    }
}

impl ByteSource for SerialTransport {
    fn read_chunk(
        &mut self,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<usize, TransportError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(0);
            }

            match self.port.read(buf) {
                Ok(0) => return Err(TransportError::Disconnected(self.config.port.clone())),
                Ok(n) => return Ok(n),
                Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
                Err(e) => {
                    debug!(port = %self.config.port, error = %e, "Serial read failed");
                    return Err(TransportError::Disconnected(format!(
                        "{}: {}",
                        self.config.port, e
                    )));
                }
            }
        }
    }

    fn describe(&self) -> String {
        self.config.summary()
    }
}

/// Opens real serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl TransportOpener for SerialOpener {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn ByteSource>, TransportError> {
        Ok(Box::new(SerialTransport::open(config.clone())?))
    }
}

fn map_open_error(port: &str, e: serialport::Error) -> TransportError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => TransportError::PortNotFound(port.to_string()),
        serialport::ErrorKind::Io(io_kind) => match io_kind {
            ErrorKind::NotFound => TransportError::PortNotFound(port.to_string()),
            ErrorKind::PermissionDenied => TransportError::PermissionDenied(port.to_string()),
            ErrorKind::AddrInUse | ErrorKind::WouldBlock => {
                TransportError::PortInUse(port.to_string())
            }
            _ => TransportError::ConnectionFailed(e.to_string()),
        },
        _ => TransportError::ConnectionFailed(e.to_string()),
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}
