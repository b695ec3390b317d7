//! Bench Power Supply Regulation Engine
//!
//! This crate keeps the requested voltage, current and power of a single
//! output channel consistent and drives a [`psu_protocol::CommandProtocol`]
//! whenever a request is accepted.
//!
//! # Regulation States
//!
//! - **Variable power** (default): voltage and current are set independently;
//!   each new request is clamped so that `V * I` stays within the envelope.
//! - **Constant power / CV**: voltage is held and current follows the power
//!   target.
//! - **Constant power / CC**: current is held and voltage follows the power
//!   target.
//!
//! When a change moves both setpoints, the decreasing one is sent to the
//! instrument first so the output never leaves the envelope in between.
//!
//! # Example
//!
//! ```rust
//! use psu_regulation::RegulationEngine;
//! use psu_transport::StubTransport;
//!
//! let mut engine = RegulationEngine::new(StubTransport::new());
//!
//! engine.request_current(60.0).unwrap();
//! engine.request_voltage(55.0).unwrap();
//!
//! // 55 V * 60 A would exceed the 3000 W envelope
//! assert_eq!(engine.state().requested_voltage, 50.0);
//! assert_eq!(engine.transport().written_lines().last().unwrap(), "VOLT 50\n");
//! ```

pub mod engine;
pub mod error;
pub mod state;

pub use engine::{EngineConfig, RegulationEngine, SentinelPolicy};
pub use error::{RegulationError, ValidationError};
pub use state::{
    Axis, ChannelSnapshot, ChannelState, Envelope, PollReading, Reading, RegulationMode,
    RegulationState,
};
