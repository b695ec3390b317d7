//! Error types for the SCPI command protocol

use psu_transport::TransportError;
use thiserror::Error;

/// Errors that can occur while executing a command
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The transport failed to carry the request or the reply
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    /// The reply could not be decoded or interpreted
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A wire line did not start with a catalog mnemonic
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl ProtocolError {
    /// Returns true if the failure came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::TransportFailure(_))
    }
}
