//! Network socket transport (raw SCPI over TCP)

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::codec::LineCodec;
use crate::error::TransportError;
use crate::{Transport, TransportKind};

/// Standard SCPI raw socket port
pub const SCPI_PORT: u16 = 5025;

/// Network endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Instrument host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Connect and read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.2".to_string(),
            port: SCPI_PORT,
            timeout_ms: 1000,
        }
    }
}

impl TcpConfig {
    /// `host:port` form of the endpoint, bracketing IPv6 hosts
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Transport over a TCP socket
#[derive(Debug)]
pub struct TcpTransport {
    endpoint: String,
    stream: Option<TcpStream>,
    codec: LineCodec,
    timeout_ms: u64,
}

impl TcpTransport {
    /// Connect to the endpoint described by `config`
    pub fn connect(config: &TcpConfig) -> Result<Self, TransportError> {
        let endpoint = config.endpoint();
        let timeout = Duration::from_millis(config.timeout_ms.max(1));
        let open_error = |reason: String| TransportError::Open {
            target: endpoint.clone(),
            reason,
        };

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| open_error(e.to_string()))?
            .next()
            .ok_or_else(|| open_error("host resolved to no addresses".to_string()))?;

        let stream =
            TcpStream::connect_timeout(&addr, timeout).map_err(|e| open_error(e.to_string()))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| open_error(e.to_string()))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| open_error(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| open_error(e.to_string()))?;

        debug!("Connected to {}", endpoint);

        Ok(Self {
            endpoint,
            stream: Some(stream),
            codec: LineCodec::new(),
            timeout_ms: config.timeout_ms,
        })
    }

    /// Connect, falling back to a disconnected transport on failure
    pub fn connect_or_disconnected(config: &TcpConfig) -> Self {
        match Self::connect(config) {
            Ok(transport) => transport,
            Err(e) => {
                warn!("{}", e);
                Self::disconnected(config)
            }
        }
    }

    /// A transport for `config` that never connected
    pub fn disconnected(config: &TcpConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            stream: None,
            codec: LineCodec::new(),
            timeout_ms: config.timeout_ms,
        }
    }

    /// Drop bytes left over from a reply that arrived after its read timed out
    fn discard_stale_input(&mut self) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        self.codec.clear();

        stream.set_nonblocking(true)?;
        let mut chunk = [0u8; 256];
        let mut discarded = 0;
        let drained = loop {
            match stream.read(&mut chunk) {
                Ok(0) => break Ok(()),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        stream.set_nonblocking(false)?;

        if discarded > 0 {
            debug!("tcp {} discarded {} stale bytes", self.endpoint, discarded);
        }
        drained.map_err(TransportError::from)
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.discard_stale_input()?;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        trace!("tcp {} <- {:?}", self.endpoint, String::from_utf8_lossy(payload));
        stream.write_all(payload)?;
        stream.flush()?;
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = self.codec.next_line() {
                trace!("tcp {} -> {:?}", self.endpoint, String::from_utf8_lossy(&line));
                return Ok(line);
            }

            match stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => self.codec.push_bytes(&chunk[..n])?,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    self.codec.clear();
                    return Err(TransportError::Timeout(self.timeout_ms));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    /// Spawn a one-connection server that answers each line with `reply`
    fn spawn_echo_server(reply: &'static [u8]) -> TcpConfig {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let reader = BufReader::new(stream);
            for line in reader.lines() {
                if line.is_err() {
                    break;
                }
                if writer.write_all(reply).is_err() {
                    break;
                }
            }
        });

        TcpConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout_ms: 2000,
        }
    }

    #[test]
    fn test_default_config() {
        let config = TcpConfig::default();
        assert_eq!(config.endpoint(), "192.168.0.2:5025");
    }

    #[test]
    fn test_round_trip_over_loopback() {
        let config = spawn_echo_server(b"24.00\r\n");
        let mut transport = TcpTransport::connect(&config).unwrap();
        assert!(transport.is_connected());

        transport.write(b"MEAS:VOLT?\n").unwrap();
        assert_eq!(transport.read().unwrap(), b"24.00\r\n");

        transport.write(b"MEAS:VOLT?\n").unwrap();
        assert_eq!(transport.read().unwrap(), b"24.00\r\n");
    }

    #[test]
    fn test_late_reply_discarded_before_next_command() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // Echo every line back, holding the first answer past the timeout
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let reader = BufReader::new(stream);
            for (index, line) in reader.lines().enumerate() {
                let Ok(line) = line else { break };
                if index == 0 {
                    thread::sleep(Duration::from_millis(300));
                }
                if writer.write_all(format!("{}\n", line).as_bytes()).is_err() {
                    break;
                }
            }
        });

        let config = TcpConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout_ms: 100,
        };
        let mut transport = TcpTransport::connect(&config).unwrap();

        transport.write(b"MEAS:VOLT?\n").unwrap();
        assert!(matches!(transport.read(), Err(TransportError::Timeout(100))));

        // The first answer lands in the socket buffer meanwhile
        thread::sleep(Duration::from_millis(400));

        transport.write(b"MEAS:CURR?\n").unwrap();
        assert_eq!(transport.read().unwrap(), b"MEAS:CURR?\n");
        transport.write(b"OUTP:MODE?\n").unwrap();
        assert_eq!(transport.read().unwrap(), b"OUTP:MODE?\n");
    }

    #[test]
    fn test_refused_connection_is_open_error() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = TcpConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout_ms: 200,
        };

        let err = TcpTransport::connect(&config).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));

        let mut transport = TcpTransport::connect_or_disconnected(&config);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.write(b"*IDN?\n"),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(transport.read(), Err(TransportError::NotConnected)));
    }
}
