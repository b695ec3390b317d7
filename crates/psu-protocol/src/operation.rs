//! The fixed catalog of power supply operations
//!
//! Every operation is either a [`OperationKind::Query`] (the instrument
//! answers with exactly one line) or an [`OperationKind::Action`] (no reply).

use std::fmt;

/// Whether an operation expects a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperationKind {
    /// Expects exactly one response line
    Query,
    /// Expects no response
    Action,
}

/// Operations understood by the power supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    /// Measured output voltage: `MEAS:VOLT?`
    GetVoltage,
    /// Voltage setpoint: `VOLT <v>`
    SetVoltage,
    /// Measured output current: `MEAS:CURR?`
    GetCurrent,
    /// Current setpoint: `CURR <a>`
    SetCurrent,
    /// Overcurrent protection state: `CURR:PROT:STAT?`
    GetOcpState,
    /// Enable/disable overcurrent protection: `CURR:PROT:STAT ON`
    SetOcpState,
    /// Overcurrent protection trip delay: `CURR:PROT:DEL 100ms`
    SetOcpDelay,
    /// Selected output channel: `INST?`
    GetOutputChannel,
    /// Select output channel: `INST CH1`
    SetOutputChannel,
    /// Regulation mode the output is in (`CV`/`CC`): `OUTP:MODE?`
    GetOutputMode,
    /// Output on/off: `OUTP ON`
    SetOutputState,
    /// Reset to power-on defaults: `*RST`
    Reset,
    /// Identification string: `*IDN?`
    GetId,
    /// Run the self test and return its result code: `*TST?`
    SelfTest,
    /// Detail for the last self test: `DIAG:TEST?`
    GetSelfTestInfo,
    /// Clear status registers: `*CLS`
    ClearStatus,
    /// Standard event status register: `*ESR?`
    GetEventStatus,
}

impl Operation {
    /// Every operation in the catalog
    pub const ALL: [Operation; 17] = [
        Operation::GetVoltage,
        Operation::SetVoltage,
        Operation::GetCurrent,
        Operation::SetCurrent,
        Operation::GetOcpState,
        Operation::SetOcpState,
        Operation::SetOcpDelay,
        Operation::GetOutputChannel,
        Operation::SetOutputChannel,
        Operation::GetOutputMode,
        Operation::SetOutputState,
        Operation::Reset,
        Operation::GetId,
        Operation::SelfTest,
        Operation::GetSelfTestInfo,
        Operation::ClearStatus,
        Operation::GetEventStatus,
    ];

    /// Catalog name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetVoltage => "GET_VOLTAGE",
            Operation::SetVoltage => "SET_VOLTAGE",
            Operation::GetCurrent => "GET_CURRENT",
            Operation::SetCurrent => "SET_CURRENT",
            Operation::GetOcpState => "GET_OCP_STATE",
            Operation::SetOcpState => "SET_OCP_STATE",
            Operation::SetOcpDelay => "SET_OCP_DELAY",
            Operation::GetOutputChannel => "GET_OUTPUT_CHANNEL",
            Operation::SetOutputChannel => "SET_OUTPUT_CHANNEL",
            Operation::GetOutputMode => "GET_OUTPUT_MODE",
            Operation::SetOutputState => "SET_OUTPUT_STATE",
            Operation::Reset => "RESET",
            Operation::GetId => "GET_ID",
            Operation::SelfTest => "SELF_TEST",
            Operation::GetSelfTestInfo => "GET_SELF_TEST_INFO",
            Operation::ClearStatus => "CLEAR_STATUS",
            Operation::GetEventStatus => "GET_EVENT_STATUS",
        }
    }

    /// Protocol mnemonic sent on the wire
    pub fn wire_token(&self) -> &'static str {
        match self {
            Operation::GetVoltage => "MEAS:VOLT?",
            Operation::SetVoltage => "VOLT",
            Operation::GetCurrent => "MEAS:CURR?",
            Operation::SetCurrent => "CURR",
            Operation::GetOcpState => "CURR:PROT:STAT?",
            Operation::SetOcpState => "CURR:PROT:STAT",
            Operation::SetOcpDelay => "CURR:PROT:DEL",
            Operation::GetOutputChannel => "INST?",
            Operation::SetOutputChannel => "INST",
            Operation::GetOutputMode => "OUTP:MODE?",
            Operation::SetOutputState => "OUTP",
            Operation::Reset => "*RST",
            Operation::GetId => "*IDN?",
            Operation::SelfTest => "*TST?",
            Operation::GetSelfTestInfo => "DIAG:TEST?",
            Operation::ClearStatus => "*CLS",
            Operation::GetEventStatus => "*ESR?",
        }
    }

    /// Whether the operation expects a reply
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::GetVoltage
            | Operation::GetCurrent
            | Operation::GetOcpState
            | Operation::GetOutputChannel
            | Operation::GetOutputMode
            | Operation::GetId
            | Operation::SelfTest
            | Operation::GetSelfTestInfo
            | Operation::GetEventStatus => OperationKind::Query,
            Operation::SetVoltage
            | Operation::SetCurrent
            | Operation::SetOcpState
            | Operation::SetOcpDelay
            | Operation::SetOutputChannel
            | Operation::SetOutputState
            | Operation::Reset
            | Operation::ClearStatus => OperationKind::Action,
        }
    }

    /// Returns true if this operation expects a reply
    pub fn is_query(&self) -> bool {
        self.kind() == OperationKind::Query
    }

    /// Look up an operation by catalog name (e.g. `SET_VOLTAGE`)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Look up an operation by wire mnemonic
    ///
    /// SCPI mnemonics are case-insensitive, so `meas:volt?` matches too.
    pub fn from_wire_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.wire_token().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
