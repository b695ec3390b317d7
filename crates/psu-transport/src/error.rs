//! Error types for power supply transports

use thiserror::Error;

/// Errors that can occur while opening or using a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not be opened
    #[error("failed to open {target}: {reason}")]
    Open { target: String, reason: String },

    /// The transport never opened; permanent for this instance
    #[error("transport is not connected")]
    NotConnected,

    /// No complete reply arrived within the read timeout
    #[error("timeout after {0}ms waiting for a reply")]
    Timeout(u64),

    /// The remote end closed the connection
    #[error("connection closed by peer")]
    Closed,

    /// A reply grew past the line limit without a terminator
    #[error("reply exceeded {max} bytes without a line terminator")]
    LineTooLong { max: usize },

    /// Failure injected by the stub transport
    #[error("injected failure: {0}")]
    Injected(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns true if retrying on this transport instance cannot succeed
    pub fn is_permanent(&self) -> bool {
        matches!(self, TransportError::NotConnected | TransportError::Open { .. })
    }
}
