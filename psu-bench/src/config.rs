//! Bench configuration
//!
//! Loaded from an optional JSON file; anything missing falls back to its
//! default. Command line flags are applied on top by the caller.

use std::path::{Path, PathBuf};

use psu_regulation::EngineConfig;
use psu_sim::{NoiseConfig, ScheduleConfig, SimulatedTransport, VirtualSupplyConfig};
use psu_transport::{
    BoxedTransport, SerialConfig, SerialTransport, StubTransport, TcpConfig, TcpTransport,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors loading the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid envelope: {0}")]
    Envelope(#[from] psu_regulation::ValidationError),
}

/// Which transport to open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// USB virtual COM port
    Serial(SerialConfig),
    /// Raw SCPI socket
    Tcp(TcpConfig),
    /// Answers every query with a fixed debug line
    Stub,
    /// In-process virtual supply
    Simulated,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Serial(SerialConfig::default())
    }
}

impl TransportConfig {
    /// Parse `HOST[:PORT]`, using the standard SCPI port when none is given
    ///
    /// IPv6 hosts carry a port only in bracketed form (`[::1]:5025`).
    pub fn tcp_from_endpoint(endpoint: &str) -> Self {
        let mut config = TcpConfig::default();
        let (host, port) = split_endpoint(endpoint);
        config.host = host.to_string();
        if let Some(port) = port {
            config.port = port;
        }
        TransportConfig::Tcp(config)
    }

    /// Open the transport
    ///
    /// Hardware that cannot be reached yields a disconnected transport whose
    /// operations fail with `NotConnected`.
    pub fn open(&self, supply: &VirtualSupplyConfig) -> BoxedTransport {
        match self {
            TransportConfig::Serial(config) => {
                Box::new(SerialTransport::open_or_disconnected(config))
            }
            TransportConfig::Tcp(config) => Box::new(TcpTransport::connect_or_disconnected(config)),
            TransportConfig::Stub => Box::new(StubTransport::new()),
            TransportConfig::Simulated => {
                Box::new(SimulatedTransport::from_config(supply.clone()))
            }
        }
    }
}

fn split_endpoint(endpoint: &str) -> (&str, Option<u16>) {
    if let Some((host, tail)) = endpoint
        .strip_prefix('[')
        .and_then(|rest| rest.split_once(']'))
    {
        return (host, tail.strip_prefix(':').and_then(|p| p.parse().ok()));
    }

    match endpoint.rsplit_once(':') {
        // More than one colon is a bare IPv6 address
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (endpoint, None),
        },
        _ => (endpoint, None),
    }
}

/// Everything the bench driver can be configured with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub transport: TransportConfig,
    pub engine: EngineConfig,
    pub noise: NoiseConfig,
    pub schedule: ScheduleConfig,
    /// Virtual supply used by the simulated transport
    pub supply: VirtualSupplyConfig,
}

impl BenchConfig {
    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            debug!("No configuration file, using defaults");
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.engine.envelope.validate()?;
        Ok(config)
    }
}
