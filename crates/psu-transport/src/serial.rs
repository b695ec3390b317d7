//! Serial (USB virtual COM port / RS-232) transport

use std::io::{Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, trace, warn};

use crate::codec::LineCodec;
use crate::error::TransportError;
use crate::{Transport, TransportKind};

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port path, e.g. `/dev/ttyUSB0` or `COM8`
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "COM8".to_string(),
            baud_rate: 115_200,
            timeout_ms: 500,
        }
    }
}

/// Transport over a serial port
pub struct SerialTransport {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
    codec: LineCodec,
    timeout_ms: u64,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port_name", &self.port_name)
            .field("connected", &self.port.is_some())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl SerialTransport {
    /// Open the serial port described by `config`
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()
            .map_err(|e| TransportError::Open {
                target: config.port.clone(),
                reason: e.to_string(),
            })?;

        debug!("Opened serial port {} at {} baud", config.port, config.baud_rate);

        Ok(Self {
            port_name: config.port.clone(),
            port: Some(port),
            codec: LineCodec::new(),
            timeout_ms: config.timeout_ms,
        })
    }

    /// Open the port, falling back to a disconnected transport on failure
    ///
    /// The returned transport fails every operation with
    /// [`TransportError::NotConnected`] when the open failed.
    pub fn open_or_disconnected(config: &SerialConfig) -> Self {
        match Self::open(config) {
            Ok(transport) => transport,
            Err(e) => {
                warn!("{}", e);
                Self::disconnected(config)
            }
        }
    }

    /// A transport for `config` that never opened
    pub fn disconnected(config: &SerialConfig) -> Self {
        Self {
            port_name: config.port.clone(),
            port: None,
            codec: LineCodec::new(),
            timeout_ms: config.timeout_ms,
        }
    }

    /// Drop bytes left over from a reply that arrived after its read timed out
    fn discard_stale_input(&mut self) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        self.codec.clear();

        let stale = port.bytes_to_read().unwrap_or(0);
        port.clear(ClearBuffer::Input).map_err(std::io::Error::from)?;
        if stale > 0 {
            debug!("serial {} discarded {} stale bytes", self.port_name, stale);
        }
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.discard_stale_input()?;
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        trace!("serial {} <- {:?}", self.port_name, String::from_utf8_lossy(payload));
        port.write_all(payload)?;
        port.flush()?;
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = self.codec.next_line() {
                trace!("serial {} -> {:?}", self.port_name, String::from_utf8_lossy(&line));
                return Ok(line);
            }

            match port.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => self.codec.push_bytes(&chunk[..n])?,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    self.codec.clear();
                    return Err(TransportError::Timeout(self.timeout_ms));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        format!("serial {}", self.port_name)
    }
}
