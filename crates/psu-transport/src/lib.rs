//! Bench Power Supply Transports
//!
//! This crate provides the byte-oriented duplex channels that carry
//! SCPI command lines to a bench power supply and bring its replies back:
//!
//! - **Serial**: USB/RS-232 virtual COM port via the `serialport` crate
//! - **TCP**: raw SCPI socket (port 5025 on most instruments)
//! - **Stub**: deterministic in-memory transport for tests and dry runs
//!
//! # Architecture
//!
//! Every transport implements [`Transport`]: `write` sends one complete
//! command line and `read` returns exactly one reply line. Transports are
//! synchronous and bounded by a read timeout; the caller owns the policy for
//! what to do when a read fails.
//!
//! A transport that could not be opened is still a value: it is constructed in
//! a disconnected state and every `write`/`read` on it fails with
//! [`TransportError::NotConnected`]. Constructors that can fail report
//! [`TransportError::Open`] instead, so a failed open is never confused with a
//! later I/O failure.
//!
//! # Example
//!
//! ```rust
//! use psu_transport::{StubTransport, Transport};
//!
//! let mut stub = StubTransport::new();
//! stub.push_reply("12.5\n");
//!
//! stub.write(b"MEAS:VOLT?\n").unwrap();
//! assert_eq!(stub.read().unwrap(), b"12.5\n");
//! assert_eq!(stub.written_lines(), vec!["MEAS:VOLT?\n".to_string()]);
//! ```

pub mod codec;
pub mod error;
pub mod serial;
pub mod stub;
pub mod tcp;

pub use codec::LineCodec;
pub use error::TransportError;
pub use serial::{SerialConfig, SerialTransport};
pub use stub::{StubReply, StubTransport};
pub use tcp::{TcpConfig, TcpTransport};

use serde::{Deserialize, Serialize};

/// Identifies which kind of channel a transport talks over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// USB or RS-232 serial link
    Serial,
    /// Network socket
    Tcp,
    /// In-memory stub with fixed or scripted replies
    Stub,
    /// Software model of a power supply
    Simulated,
}

impl TransportKind {
    /// Returns a human-readable name for the transport kind
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::Serial => "Serial",
            TransportKind::Tcp => "TCP",
            TransportKind::Stub => "Stub",
            TransportKind::Simulated => "Simulated",
        }
    }

    /// Returns whether this transport talks to real hardware
    pub fn is_hardware(&self) -> bool {
        matches!(self, TransportKind::Serial | TransportKind::Tcp)
    }
}

/// A byte-oriented duplex channel to a power supply
pub trait Transport: Send {
    /// Send one complete command line
    fn write(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Receive exactly one reply line (terminator included when present)
    fn read(&mut self) -> Result<Vec<u8>, TransportError>;

    /// The kind of channel this transport uses
    fn kind(&self) -> TransportKind;

    /// Whether the transport was opened successfully
    fn is_connected(&self) -> bool {
        true
    }

    /// Short description of the endpoint for log messages
    fn describe(&self) -> String;
}

/// A transport chosen at runtime
pub type BoxedTransport = Box<dyn Transport>;

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        (**self).write(payload)
    }

    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).read()
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
