//! Command invocations and their wire encoding
//!
//! # Format
//! - Line: `<mnemonic> <arg0> <arg1>...\n`
//! - Arguments are separated by single spaces; a command without arguments
//!   is just `<mnemonic>\n`
//! - Terminator: `\n` (0x0A)

use std::fmt;

use crate::error::ProtocolError;
use crate::operation::Operation;
use crate::EncodeCommand;

/// An operation together with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    operation: Operation,
    args: Vec<String>,
}

impl Invocation {
    /// Create an invocation with no arguments
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            args: Vec::new(),
        }
    }

    /// Create an invocation from already-rendered arguments
    pub fn with_args<I, A>(operation: Operation, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: fmt::Display,
    {
        Self {
            operation,
            args: args.into_iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// The operation being invoked
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Rendered arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// First argument, if any
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// The full wire line, terminator included
    pub fn line(&self) -> String {
        let mut line = String::from(self.operation.wire_token());
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push('\n');
        line
    }

    /// Parse a wire line back into an invocation
    ///
    /// Used by simulated instruments on the receiving end of the protocol.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.split_whitespace();
        let mnemonic = tokens
            .next()
            .ok_or_else(|| ProtocolError::UnknownCommand(String::new()))?;
        let operation = Operation::from_wire_token(mnemonic)
            .ok_or_else(|| ProtocolError::UnknownCommand(mnemonic.to_string()))?;

        Ok(Self {
            operation,
            args: tokens.map(str::to_string).collect(),
        })
    }
}

impl EncodeCommand for Invocation {
    fn encode(&self) -> Vec<u8> {
        self.line().into_bytes()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.line().trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_args() {
        assert_eq!(Invocation::new(Operation::Reset).encode(), b"*RST\n");
        assert_eq!(Invocation::new(Operation::GetVoltage).encode(), b"MEAS:VOLT?\n");
    }

    #[test]
    fn test_encode_with_args() {
        let inv = Invocation::new(Operation::SetVoltage).arg(10.0);
        assert_eq!(inv.encode(), b"VOLT 10\n");

        let inv = Invocation::new(Operation::SetVoltage).arg(12.5);
        assert_eq!(inv.encode(), b"VOLT 12.5\n");

        let inv = Invocation::with_args(Operation::SetOutputChannel, ["CH1"]);
        assert_eq!(inv.encode(), b"INST CH1\n");
    }

    #[test]
    fn test_encode_two_args() {
        let inv = Invocation::new(Operation::SetOcpDelay).arg(100).arg("ms");
        assert_eq!(inv.line(), "CURR:PROT:DEL 100 ms\n");
        assert_eq!(inv.to_string(), "CURR:PROT:DEL 100 ms");
    }

    #[test]
    fn test_parse() {
        let inv = Invocation::parse("VOLT 24.5\n").unwrap();
        assert_eq!(inv.operation(), Operation::SetVoltage);
        assert_eq!(inv.first_arg(), Some("24.5"));

        let inv = Invocation::parse("  outp   ON \r\n").unwrap();
        assert_eq!(inv.operation(), Operation::SetOutputState);
        assert_eq!(inv.args(), ["ON"]);

        let inv = Invocation::parse("*IDN?").unwrap();
        assert_eq!(inv.operation(), Operation::GetId);
        assert!(inv.args().is_empty());
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(
            Invocation::parse("SYST:ERR?\n"),
            Err(ProtocolError::UnknownCommand(m)) if m == "SYST:ERR?"
        ));
        assert!(matches!(
            Invocation::parse("   \n"),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }
}
