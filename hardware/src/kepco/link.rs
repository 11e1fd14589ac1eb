//! Instrument link transport for Kepco BOP power supplies
//!
//! A link is a write-only byte pipe to one power supply. The supplies are
//! driven open-loop: commands are written and never read back, so the link
//! only needs to write, apply a timeout, and close when dropped.
//!
//! # Descriptors
//!
//! Links are addressed with VISA-style resource strings so existing bench
//! notes keep working:
//!
//! | Descriptor                          | Transport                    |
//! |-------------------------------------|------------------------------|
//! | `ASRL3::INSTR`                      | Serial port 3 (`COM3`, `/dev/ttyS2`) |
//! | `/dev/ttyUSB0`, `COM7`              | Serial device by path        |
//! | `TCPIP0::192.168.1.156::5025::SOCKET` | Raw TCP socket             |
//! | `MOCK::x`                           | In-memory recording link     |
//!
//! GPIB and VXI-11 (`TCPIP0::host::INSTR`) resources have no backend here and
//! are rejected with [`KepcoError::LinkUnavailable`].

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::mock::MockLink;

/// Default write timeout for every link (5 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Factory default baud rate of the BOP serial interface.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Errors that can occur while talking to a power supply.
#[derive(Error, Debug)]
pub enum KepcoError {
    /// Low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No transport can service the descriptor. Fatal at startup.
    #[error("No transport available for descriptor {0:?}")]
    LinkUnavailable(String),

    /// The transport exists but the device could not be opened.
    #[error("Cannot open a session to {descriptor}: {reason}")]
    OpenFailed {
        /// Descriptor that failed to open
        descriptor: String,
        /// Transport-reported reason
        reason: String,
    },

    /// A single command write failed.
    #[error("Error writing to {descriptor}: {source}")]
    WriteFailed {
        /// Descriptor of the supply being written
        descriptor: String,
        /// Underlying transport error
        #[source]
        source: std::io::Error,
    },

    /// The supply never opened, so every write fails.
    #[error("{0} is not connected")]
    NotConnected(String),
}

/// Result type for power supply operations.
pub type KepcoResult<T> = Result<T, KepcoError>;

/// A write-only byte pipe to one instrument.
///
/// Implementations close their underlying session when dropped.
pub trait InstrumentLink: Send {
    /// Write the whole buffer, returning the number of bytes written.
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize>;

    /// Change the transport timeout.
    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;
}

/// Transport settings shared by all links of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    pub timeout: Duration,
    pub baud_rate: u32,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// A parsed instrument resource string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    /// Serial device path as understood by the OS (`COM3`, `/dev/ttyS2`).
    Serial { path: String },
    /// Raw socket to a LAN-attached supply.
    TcpSocket { host: String, port: u16 },
    /// In-memory recording link for dry runs.
    Mock { name: String },
}

impl Descriptor {
    /// Parse a VISA-style resource string.
    ///
    /// # Errors
    ///
    /// Returns [`KepcoError::LinkUnavailable`] for empty strings, malformed
    /// resources, and resource classes without a backend (GPIB, VXI-11).
    ///
    /// # Example
    ///
    /// ```
    /// use hardware::kepco::Descriptor;
    ///
    /// let desc = Descriptor::parse("TCPIP0::10.0.0.7::5025::SOCKET").unwrap();
    /// assert_eq!(
    ///     desc,
    ///     Descriptor::TcpSocket { host: "10.0.0.7".to_string(), port: 5025 }
    /// );
    /// ```
    pub fn parse(descriptor: &str) -> KepcoResult<Self> {
        let trimmed = descriptor.trim();
        let unavailable = || KepcoError::LinkUnavailable(descriptor.to_string());

        if trimmed.is_empty() {
            return Err(unavailable());
        }

        let parts: Vec<&str> = trimmed.split("::").collect();
        let class = parts[0].to_ascii_uppercase();

        if class == "MOCK" {
            let name = parts.get(1).copied().unwrap_or("mock").to_string();
            return Ok(Descriptor::Mock { name });
        }

        if let Some(number) = class.strip_prefix("ASRL") {
            if parts.len() > 2 || parts.get(1).is_some_and(|s| !s.eq_ignore_ascii_case("INSTR")) {
                return Err(unavailable());
            }
            let number: u32 = number.parse().map_err(|_| unavailable())?;
            if number == 0 {
                return Err(unavailable());
            }
            return Ok(Descriptor::Serial {
                path: serial_port_path(number),
            });
        }

        if class.starts_with("TCPIP") {
            // Only raw sockets: TCPIP<n>::<host>::<port>::SOCKET
            if parts.len() != 4 || !parts[3].eq_ignore_ascii_case("SOCKET") {
                return Err(unavailable());
            }
            let port: u16 = parts[2].parse().map_err(|_| unavailable())?;
            return Ok(Descriptor::TcpSocket {
                host: parts[1].to_string(),
                port,
            });
        }

        if parts.len() == 1 && (trimmed.starts_with('/') || is_com_port(&class)) {
            return Ok(Descriptor::Serial {
                path: trimmed.to_string(),
            });
        }

        Err(unavailable())
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Descriptor::Serial { path } => write!(f, "serial:{path}"),
            Descriptor::TcpSocket { host, port } => write!(f, "tcp:{host}:{port}"),
            Descriptor::Mock { name } => write!(f, "mock:{name}"),
        }
    }
}

fn is_com_port(name: &str) -> bool {
    name.strip_prefix("COM")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(windows)]
fn serial_port_path(number: u32) -> String {
    format!("COM{number}")
}

// VISA numbers serial resources from 1; ASRL1 is the first UART.
#[cfg(not(windows))]
fn serial_port_path(number: u32) -> String {
    format!("/dev/ttyS{}", number - 1)
}

/// Open a link for a parsed descriptor.
///
/// # Errors
///
/// Returns [`KepcoError::OpenFailed`] if the device exists as a transport but
/// could not be opened (port busy, host unreachable, ...).
pub fn open_link(
    descriptor: &Descriptor,
    options: &LinkOptions,
) -> KepcoResult<Box<dyn InstrumentLink>> {
    match descriptor {
        Descriptor::Serial { path } => Ok(Box::new(SerialLink::open(path, options)?)),
        Descriptor::TcpSocket { host, port } => {
            Ok(Box::new(TcpLink::connect(host, *port, options)?))
        }
        Descriptor::Mock { name } => Ok(Box::new(MockLink::new(name.clone()))),
    }
}

/// Serial (RS-232) link using the `serialport` crate, 8N1 framing.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink {
    /// Open a serial port at the configured baud rate and timeout.
    pub fn open(path: &str, options: &LinkOptions) -> KepcoResult<Self> {
        let port = serialport::new(path, options.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(options.timeout)
            .open()
            .map_err(|e| KepcoError::OpenFailed {
                descriptor: path.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Opened serial link {} at {} baud", path, options.baud_rate);
        Ok(Self { port })
    }
}

impl InstrumentLink for SerialLink {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(bytes.len())
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }
}

/// Raw TCP socket link for LAN-attached supplies.
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    /// Connect to `host:port`, trying each resolved address in turn.
    pub fn connect(host: &str, port: u16, options: &LinkOptions) -> KepcoResult<Self> {
        let open_failed = |reason: String| KepcoError::OpenFailed {
            descriptor: format!("{host}:{port}"),
            reason,
        };

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| open_failed(format!("Failed to resolve: {e}")))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, options.timeout) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(options.timeout))?;
                    stream.set_nodelay(true)?;
                    debug!("Connected to {} via TCP", addr);
                    return Ok(Self { stream });
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(open_failed(match last_err {
            Some(e) => format!("Failed to connect: {e}"),
            None => "No addresses resolved".to_string(),
        }))
    }
}

impl InstrumentLink for TcpLink {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(bytes.len())
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.stream.set_write_timeout(Some(timeout))
    }
}
