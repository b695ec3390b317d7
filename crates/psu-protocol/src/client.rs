//! Request/response execution over a transport

use std::fmt;
use std::time::Duration;

use psu_transport::Transport;
use tracing::{debug, trace};

use crate::error::ProtocolError;
use crate::invocation::Invocation;
use crate::operation::{Operation, OperationKind};
use crate::response::{
    parse_bool, parse_number, trim_reply, Identity, OutputEncoding, SelfTestReport,
};
use crate::EncodeCommand;

/// Executes catalog operations over an exclusively owned transport
///
/// The protocol is stateless between calls apart from the transport it owns.
/// Nothing is retried here; retry policy belongs to the caller.
#[derive(Debug)]
pub struct CommandProtocol<T> {
    transport: T,
}

impl<T: Transport> CommandProtocol<T> {
    /// Bind a protocol to a transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// The transport in use
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Swap in a new transport, returning the old one
    pub fn replace_transport(&mut self, transport: T) -> T {
        std::mem::replace(&mut self.transport, transport)
    }

    /// Execute `op` with `args`
    ///
    /// Returns `None` for actions (the transport is never read) and the
    /// trimmed reply line for queries.
    pub fn execute(
        &mut self,
        op: Operation,
        args: &[&dyn fmt::Display],
    ) -> Result<Option<String>, ProtocolError> {
        self.send(&Invocation::with_args(op, args))
    }

    /// Execute a prepared invocation
    pub fn send(&mut self, invocation: &Invocation) -> Result<Option<String>, ProtocolError> {
        debug!("{} -> {}", self.transport.describe(), invocation);
        self.transport.write(&invocation.encode())?;

        if invocation.operation().kind() == OperationKind::Action {
            return Ok(None);
        }

        let raw = self.transport.read()?;
        let text = String::from_utf8(raw).map_err(|e| {
            ProtocolError::MalformedResponse(format!(
                "reply to {} is not valid text: {}",
                invocation.operation(),
                e
            ))
        })?;
        let reply = trim_reply(&text).to_string();
        trace!("{} <- {:?}", self.transport.describe(), reply);
        Ok(Some(reply))
    }

    /// Execute a query and return its reply
    pub fn query(&mut self, op: Operation) -> Result<String, ProtocolError> {
        self.send(&Invocation::new(op))?.ok_or_else(|| {
            ProtocolError::MalformedResponse(format!("{} is not a query", op))
        })
    }

    /// Execute an action
    pub fn action(&mut self, invocation: Invocation) -> Result<(), ProtocolError> {
        self.send(&invocation).map(|_| ())
    }

    /// Measured output voltage in volts
    pub fn measure_voltage(&mut self) -> Result<f64, ProtocolError> {
        parse_number(&self.query(Operation::GetVoltage)?)
    }

    /// Measured output current in amps
    pub fn measure_current(&mut self) -> Result<f64, ProtocolError> {
        parse_number(&self.query(Operation::GetCurrent)?)
    }

    /// Regulation mode string reported by the output (`CV`, `CC`, ...)
    ///
    /// A numeric reply is rejected; it is a measurement answering some
    /// other query.
    pub fn output_mode(&mut self) -> Result<String, ProtocolError> {
        let mode = self.query(Operation::GetOutputMode)?;
        let mode = mode.trim();
        if mode.is_empty() {
            return Err(ProtocolError::MalformedResponse("empty output mode".into()));
        }
        if parse_number(mode).is_ok() {
            return Err(ProtocolError::MalformedResponse(format!(
                "expected an output mode, got {:?}",
                mode
            )));
        }
        Ok(mode.to_string())
    }

    /// Set the voltage setpoint
    pub fn set_voltage(&mut self, volts: f64) -> Result<(), ProtocolError> {
        self.action(Invocation::new(Operation::SetVoltage).arg(volts))
    }

    /// Set the current setpoint
    pub fn set_current(&mut self, amps: f64) -> Result<(), ProtocolError> {
        self.action(Invocation::new(Operation::SetCurrent).arg(amps))
    }

    /// Switch the output on or off
    pub fn set_output(&mut self, on: bool, encoding: OutputEncoding) -> Result<(), ProtocolError> {
        self.action(Invocation::new(Operation::SetOutputState).arg(encoding.render(on)))
    }

    /// Parsed `*IDN?` reply
    pub fn identify(&mut self) -> Result<Identity, ProtocolError> {
        Identity::parse(&self.query(Operation::GetId)?)
    }

    /// Run `*TST?`, fetching `DIAG:TEST?` detail when it fails
    pub fn self_test(&mut self) -> Result<SelfTestReport, ProtocolError> {
        let reply = self.query(Operation::SelfTest)?;
        let code = reply.trim().parse::<i32>().map_err(|_| {
            ProtocolError::MalformedResponse(format!("expected a self test code, got {:?}", reply))
        })?;

        let detail = if code != 0 {
            Some(self.query(Operation::GetSelfTestInfo)?)
        } else {
            None
        };

        Ok(SelfTestReport { code, detail })
    }

    /// Reset the instrument to power-on defaults
    pub fn reset(&mut self) -> Result<(), ProtocolError> {
        self.action(Invocation::new(Operation::Reset))
    }

    /// Clear the status registers
    pub fn clear_status(&mut self) -> Result<(), ProtocolError> {
        self.action(Invocation::new(Operation::ClearStatus))
    }

    /// Standard event status register
    pub fn event_status(&mut self) -> Result<u8, ProtocolError> {
        let reply = self.query(Operation::GetEventStatus)?;
        reply.trim().parse::<u8>().map_err(|_| {
            ProtocolError::MalformedResponse(format!("expected a register value, got {:?}", reply))
        })
    }

    /// Select the output channel the following commands apply to
    pub fn select_channel(&mut self, channel: &str) -> Result<(), ProtocolError> {
        self.action(Invocation::new(Operation::SetOutputChannel).arg(channel))
    }

    /// Currently selected output channel
    pub fn selected_channel(&mut self) -> Result<String, ProtocolError> {
        Ok(self.query(Operation::GetOutputChannel)?.trim().to_string())
    }

    /// Enable or disable overcurrent protection
    pub fn set_overcurrent_protection(
        &mut self,
        enabled: bool,
        encoding: OutputEncoding,
    ) -> Result<(), ProtocolError> {
        self.action(Invocation::new(Operation::SetOcpState).arg(encoding.render(enabled)))
    }

    /// Whether overcurrent protection is enabled
    pub fn overcurrent_protection(&mut self) -> Result<bool, ProtocolError> {
        parse_bool(&self.query(Operation::GetOcpState)?)
    }

    /// Set the overcurrent protection trip delay
    pub fn set_overcurrent_delay(&mut self, delay: Duration) -> Result<(), ProtocolError> {
        self.action(
            Invocation::new(Operation::SetOcpDelay).arg(format!("{}ms", delay.as_millis())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psu_transport::{StubTransport, TransportError};

    fn protocol_with(replies: &[&str]) -> CommandProtocol<StubTransport> {
        CommandProtocol::new(StubTransport::scripted(replies.iter().copied()))
    }

    #[test]
    fn test_action_never_reads() {
        let mut stub = StubTransport::new();
        stub.forbid_reads(true);
        let mut protocol = CommandProtocol::new(stub);

        let result = protocol.execute(Operation::SetVoltage, &[&10.0]).unwrap();
        assert_eq!(result, None);
        protocol.execute(Operation::Reset, &[]).unwrap();

        assert_eq!(protocol.transport().read_count(), 0);
        assert_eq!(
            protocol.transport().written_lines(),
            vec!["VOLT 10\n", "*RST\n"]
        );
    }

    #[test]
    fn test_query_reads_one_line() {
        let mut protocol = protocol_with(&["24.000\r\n", "unused\n"]);
        let reply = protocol.execute(Operation::GetVoltage, &[]).unwrap();
        assert_eq!(reply.as_deref(), Some("24.000"));
        assert_eq!(protocol.transport().read_count(), 1);
        assert_eq!(protocol.transport().pending_replies(), 1);
    }

    #[test]
    fn test_default_stub_reply() {
        let mut protocol = CommandProtocol::new(StubTransport::new());
        let reply = protocol.execute(Operation::GetId, &[]).unwrap();
        assert_eq!(reply.as_deref(), Some("READ DEBUG"));
    }

    #[test]
    fn test_mixed_args() {
        let mut protocol = CommandProtocol::new(StubTransport::new());
        protocol
            .execute(Operation::SetOcpDelay, &[&100, &"ms"])
            .unwrap();
        assert_eq!(
            protocol.transport().written_lines(),
            vec!["CURR:PROT:DEL 100 ms\n"]
        );
    }

    #[test]
    fn test_write_failure_is_transport_failure() {
        let mut stub = StubTransport::new();
        stub.set_write_error(true);
        let mut protocol = CommandProtocol::new(stub);

        let err = protocol.execute(Operation::SetVoltage, &[&1.0]).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_read_failure_is_transport_failure() {
        let mut stub = StubTransport::new();
        stub.push_failure();
        let mut protocol = CommandProtocol::new(stub);

        let err = protocol.execute(Operation::GetCurrent, &[]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TransportFailure(TransportError::Injected(_))
        ));
    }

    #[test]
    fn test_not_connected_surfaces() {
        let mut protocol = CommandProtocol::new(StubTransport::disconnected());
        let err = protocol.execute(Operation::Reset, &[]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TransportFailure(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut stub = StubTransport::new();
        stub.push_reply(vec![0xFF, 0xFE, b'\n']);
        let mut protocol = CommandProtocol::new(stub);

        let err = protocol.execute(Operation::GetVoltage, &[]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedResponse(_)));
    }

    #[test]
    fn test_measurements() {
        let mut protocol = protocol_with(&["12.5\n", "1.25\n", "CV\n"]);
        assert_eq!(protocol.measure_voltage().unwrap(), 12.5);
        assert_eq!(protocol.measure_current().unwrap(), 1.25);
        assert_eq!(protocol.output_mode().unwrap(), "CV");
    }

    #[test]
    fn test_numeric_output_mode_rejected() {
        let mut protocol = protocol_with(&["12.000\n", "\n"]);
        assert!(matches!(
            protocol.output_mode(),
            Err(ProtocolError::MalformedResponse(_))
        ));
        assert!(matches!(
            protocol.output_mode(),
            Err(ProtocolError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_non_numeric_measurement() {
        let mut protocol = CommandProtocol::new(StubTransport::new());
        assert!(matches!(
            protocol.measure_voltage(),
            Err(ProtocolError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_identify() {
        let mut protocol = protocol_with(&["Keysight Technologies,N5767A,US123,B.02\n"]);
        let id = protocol.identify().unwrap();
        assert_eq!(id.manufacturer, "Keysight Technologies");
        assert_eq!(id.model.as_deref(), Some("N5767A"));
        assert_eq!(protocol.transport().written_lines(), vec!["*IDN?\n"]);
    }

    #[test]
    fn test_self_test_pass_skips_diagnostics() {
        let mut protocol = protocol_with(&["0\n"]);
        let report = protocol.self_test().unwrap();
        assert!(report.passed());
        assert_eq!(protocol.transport().written_lines(), vec!["*TST?\n"]);
    }

    #[test]
    fn test_self_test_failure_fetches_detail() {
        let mut protocol = protocol_with(&["1\n", "FAN STALL\n"]);
        let report = protocol.self_test().unwrap();
        assert!(!report.passed());
        assert_eq!(report.detail.as_deref(), Some("FAN STALL"));
        assert_eq!(
            protocol.transport().written_lines(),
            vec!["*TST?\n", "DIAG:TEST?\n"]
        );
    }

    #[test]
    fn test_overcurrent_protection() {
        let mut protocol = protocol_with(&["1\n"]);
        protocol
            .set_overcurrent_protection(true, OutputEncoding::Numeric)
            .unwrap();
        protocol
            .set_overcurrent_delay(Duration::from_millis(100))
            .unwrap();
        assert!(protocol.overcurrent_protection().unwrap());
        assert_eq!(
            protocol.transport().written_lines(),
            vec![
                "CURR:PROT:STAT 1\n",
                "CURR:PROT:DEL 100ms\n",
                "CURR:PROT:STAT?\n"
            ]
        );
    }

    #[test]
    fn test_channel_selection_and_status() {
        let mut protocol = protocol_with(&["CH1\n", "32\n"]);
        protocol.select_channel("CH1").unwrap();
        assert_eq!(protocol.selected_channel().unwrap(), "CH1");
        assert_eq!(protocol.event_status().unwrap(), 32);
        protocol.clear_status().unwrap();
        assert_eq!(
            protocol.transport().written_lines(),
            vec!["INST CH1\n", "INST?\n", "*ESR?\n", "*CLS\n"]
        );
    }

    #[test]
    fn test_replace_transport() {
        let mut protocol = CommandProtocol::new(StubTransport::with_reply("1\n"));
        protocol.reset().unwrap();

        let old = protocol.replace_transport(StubTransport::with_reply("2\n"));
        assert_eq!(old.written_lines(), vec!["*RST\n"]);
        assert!(protocol.transport().written().is_empty());
        assert_eq!(protocol.measure_voltage().unwrap(), 2.0);
    }
}
