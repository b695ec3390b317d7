//! Bench Power Supply Command Protocol
//!
//! This crate defines the fixed catalog of SCPI operations a bench power
//! supply understands and executes them over a [`psu_transport::Transport`].
//!
//! # Architecture
//!
//! - [`Operation`]: the read-only catalog. Each operation has a catalog name,
//!   a wire mnemonic, and a kind: a **Query** expects exactly one reply line,
//!   an **Action** expects none.
//! - [`Invocation`]: an operation plus arguments, encoded as a single line
//!   `"<mnemonic> <arg0> <arg1>\n"`.
//! - [`CommandProtocol`]: owns one transport, writes invocations and reads
//!   back replies for queries only. It never validates argument ranges and
//!   never retries.
//!
//! # Example
//!
//! ```rust
//! use psu_protocol::{CommandProtocol, Operation};
//! use psu_transport::StubTransport;
//!
//! let mut protocol = CommandProtocol::new(StubTransport::with_reply("12.000\n"));
//!
//! // Actions produce no reply
//! assert_eq!(protocol.execute(Operation::SetVoltage, &[&12.0]).unwrap(), None);
//!
//! // Queries return the trimmed reply line
//! let reply = protocol.execute(Operation::GetVoltage, &[]).unwrap();
//! assert_eq!(reply.as_deref(), Some("12.000"));
//! ```

pub mod client;
pub mod error;
pub mod invocation;
pub mod operation;
pub mod response;

pub use client::CommandProtocol;
pub use error::ProtocolError;
pub use invocation::Invocation;
pub use operation::{Operation, OperationKind};
pub use response::{
    parse_bool, parse_number, trim_reply, Identity, OutputEncoding, SelfTestReport,
};

/// Trait for commands that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this command to its wire format
    fn encode(&self) -> Vec<u8>;
}
