//! Error types for the virtual supply

use psu_protocol::Operation;
use thiserror::Error;

/// Why the virtual supply refused a command line
///
/// Each variant maps onto one bit of the IEEE-488.2 event status register.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupplyError {
    /// Mnemonic not in the catalog
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Argument missing or not parseable for the operation
    #[error("{operation}: bad argument {argument:?}")]
    BadArgument {
        operation: Operation,
        argument: Option<String>,
    },

    /// Argument parsed but outside what the instrument accepts
    #[error("{operation}: {value} out of range")]
    OutOfRange { operation: Operation, value: String },
}

/// Command error bit (5) of the event status register
pub const ESR_COMMAND_ERROR: u8 = 1 << 5;
/// Execution error bit (4) of the event status register
pub const ESR_EXECUTION_ERROR: u8 = 1 << 4;

impl SupplyError {
    /// Event status register bit this error sets
    pub fn esr_bit(&self) -> u8 {
        match self {
            SupplyError::UnknownCommand(_) | SupplyError::BadArgument { .. } => {
                ESR_COMMAND_ERROR
            }
            SupplyError::OutOfRange { .. } => ESR_EXECUTION_ERROR,
        }
    }
}
