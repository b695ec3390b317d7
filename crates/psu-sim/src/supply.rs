//! Virtual power supply
//!
//! A software model of a single-output SCPI bench supply. It understands the
//! full command catalog and answers measurement queries from a resistive load.

use std::time::Duration;

use psu_protocol::{parse_bool, Invocation, Operation};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::SupplyError;

/// Default overcurrent protection delay after power-on or `*RST`
pub const DEFAULT_OCP_DELAY: Duration = Duration::from_millis(100);

/// Configuration for creating a virtual supply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualSupplyConfig {
    /// Manufacturer reported by `*IDN?`
    pub manufacturer: String,
    /// Model reported by `*IDN?`
    pub model: String,
    /// Serial number reported by `*IDN?`
    pub serial: String,
    /// Firmware revision reported by `*IDN?`
    pub firmware: String,
    /// Resistance of the simulated load in ohms
    pub load_ohms: f64,
    /// Hardware ceiling for the voltage setpoint
    pub max_voltage: f64,
    /// Hardware ceiling for the current setpoint
    pub max_current: f64,
    /// Number of selectable output channels (`CH1`..`CHn`)
    pub channels: u8,
    /// Make `*TST?` fail with this diagnostic
    pub self_test_failure: Option<String>,
}

impl Default for VirtualSupplyConfig {
    fn default() -> Self {
        Self {
            manufacturer: "PSU-SIM".to_string(),
            model: "VIRTUAL-3000".to_string(),
            serial: "000001".to_string(),
            firmware: "1.0".to_string(),
            load_ohms: 10.0,
            max_voltage: 80.0,
            max_current: 120.0,
            channels: 1,
            self_test_failure: None,
        }
    }
}

/// Output regulation reported by `OUTP:MODE?`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Output disabled
    Off,
    /// Constant voltage
    Cv,
    /// Constant current
    Cc,
}

impl OutputMode {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Off => "OFF",
            OutputMode::Cv => "CV",
            OutputMode::Cc => "CC",
        }
    }
}

/// Output voltage, current and mode from the load model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub voltage: f64,
    pub current: f64,
    pub mode: OutputMode,
}

/// A simulated bench power supply
#[derive(Debug)]
pub struct VirtualSupply {
    config: VirtualSupplyConfig,
    set_voltage: f64,
    set_current: f64,
    output: bool,
    ocp_enabled: bool,
    ocp_delay: Duration,
    channel: u8,
    /// Event status register
    esr: u8,
    /// Every line received, in order
    received: Vec<String>,
}

impl Default for VirtualSupply {
    fn default() -> Self {
        Self::new(VirtualSupplyConfig::default())
    }
}

impl VirtualSupply {
    /// Create a supply in its power-on state
    pub fn new(config: VirtualSupplyConfig) -> Self {
        Self {
            config,
            set_voltage: 0.0,
            set_current: 0.0,
            output: false,
            ocp_enabled: false,
            ocp_delay: DEFAULT_OCP_DELAY,
            channel: 1,
            esr: 0,
            received: Vec::new(),
        }
    }

    /// The configuration this supply was built from
    pub fn config(&self) -> &VirtualSupplyConfig {
        &self.config
    }

    pub fn set_voltage(&self) -> f64 {
        self.set_voltage
    }

    pub fn set_current(&self) -> f64 {
        self.set_current
    }

    pub fn output_enabled(&self) -> bool {
        self.output
    }

    pub fn ocp_enabled(&self) -> bool {
        self.ocp_enabled
    }

    pub fn ocp_delay(&self) -> Duration {
        self.ocp_delay
    }

    /// Selected channel number (1-based)
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Event status register without clearing it
    pub fn event_status(&self) -> u8 {
        self.esr
    }

    /// Change the simulated load
    pub fn set_load(&mut self, ohms: f64) {
        self.config.load_ohms = ohms.max(0.0);
    }

    /// Lines received so far
    pub fn received(&self) -> &[String] {
        &self.received
    }

    /// Evaluate the load model
    ///
    /// With the output on the supply stays in CV while the load draws no more
    /// than the current limit, otherwise it falls back to CC.
    pub fn measure(&self) -> Measurement {
        if !self.output {
            return Measurement {
                voltage: 0.0,
                current: 0.0,
                mode: OutputMode::Off,
            };
        }

        let ohms = self.config.load_ohms;
        if ohms <= 0.0 {
            // Short circuit
            return Measurement {
                voltage: 0.0,
                current: self.set_current,
                mode: OutputMode::Cc,
            };
        }

        let demand = self.set_voltage / ohms;
        if demand <= self.set_current {
            Measurement {
                voltage: self.set_voltage,
                current: demand,
                mode: OutputMode::Cv,
            }
        } else {
            Measurement {
                voltage: self.set_current * ohms,
                current: self.set_current,
                mode: OutputMode::Cc,
            }
        }
    }

    /// Process one wire line and return the reply line for queries
    ///
    /// Refused commands set the matching event status bit and produce no
    /// reply, as a real instrument would.
    pub fn process_line(&mut self, line: &str) -> Option<String> {
        let text = line.trim();
        if text.is_empty() {
            return None;
        }
        self.received.push(text.to_string());
        trace!("Virtual supply <- {}", text);

        let result = Invocation::parse(text)
            .map_err(|_| {
                SupplyError::UnknownCommand(
                    text.split_whitespace().next().unwrap_or_default().to_string(),
                )
            })
            .and_then(|invocation| self.execute(&invocation));

        match result {
            Ok(reply) => reply.map(|r| format!("{}\n", r)),
            Err(e) => {
                debug!("Virtual supply refused {:?}: {}", text, e);
                self.esr |= e.esr_bit();
                None
            }
        }
    }

    /// Execute a parsed invocation
    pub fn execute(&mut self, invocation: &Invocation) -> Result<Option<String>, SupplyError> {
        let op = invocation.operation();
        match op {
            Operation::GetVoltage => Ok(Some(format!("{:.3}", self.measure().voltage))),
            Operation::GetCurrent => Ok(Some(format!("{:.3}", self.measure().current))),
            Operation::GetOutputMode => Ok(Some(self.measure().mode.as_str().to_string())),
            Operation::GetOcpState => Ok(Some(if self.ocp_enabled { "1" } else { "0" }.into())),
            Operation::GetOutputChannel => Ok(Some(format!("CH{}", self.channel))),
            Operation::GetId => Ok(Some(format!(
                "{},{},{},{}",
                self.config.manufacturer, self.config.model, self.config.serial, self.config.firmware
            ))),
            Operation::SelfTest => Ok(Some(
                if self.config.self_test_failure.is_some() { "1" } else { "0" }.into(),
            )),
            Operation::GetSelfTestInfo => Ok(Some(match &self.config.self_test_failure {
                Some(detail) => format!("1,\"{}\"", detail),
                None => "0,\"No error\"".to_string(),
            })),
            Operation::GetEventStatus => {
                // Reading the register clears it
                let esr = std::mem::take(&mut self.esr);
                Ok(Some(esr.to_string()))
            }
            Operation::SetVoltage => {
                self.set_voltage = number_arg(invocation, self.config.max_voltage)?;
                Ok(None)
            }
            Operation::SetCurrent => {
                self.set_current = number_arg(invocation, self.config.max_current)?;
                Ok(None)
            }
            Operation::SetOutputState => {
                self.output = bool_arg(invocation)?;
                Ok(None)
            }
            Operation::SetOcpState => {
                self.ocp_enabled = bool_arg(invocation)?;
                Ok(None)
            }
            Operation::SetOcpDelay => {
                self.ocp_delay = delay_arg(invocation)?;
                Ok(None)
            }
            Operation::SetOutputChannel => {
                self.channel = channel_arg(invocation, self.config.channels)?;
                Ok(None)
            }
            Operation::Reset => {
                self.reset();
                Ok(None)
            }
            Operation::ClearStatus => {
                self.esr = 0;
                Ok(None)
            }
        }
    }

    /// Restore power-on settings; the status register survives
    pub fn reset(&mut self) {
        self.set_voltage = 0.0;
        self.set_current = 0.0;
        self.output = false;
        self.ocp_enabled = false;
        self.ocp_delay = DEFAULT_OCP_DELAY;
        self.channel = 1;
    }
}

fn bad_argument(invocation: &Invocation) -> SupplyError {
    SupplyError::BadArgument {
        operation: invocation.operation(),
        argument: invocation.first_arg().map(str::to_string),
    }
}

fn number_arg(invocation: &Invocation, max: f64) -> Result<f64, SupplyError> {
    let value: f64 = invocation
        .first_arg()
        .and_then(|a| a.parse().ok())
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| bad_argument(invocation))?;

    if !(0.0..=max).contains(&value) {
        return Err(SupplyError::OutOfRange {
            operation: invocation.operation(),
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn bool_arg(invocation: &Invocation) -> Result<bool, SupplyError> {
    invocation
        .first_arg()
        .and_then(|a| parse_bool(a).ok())
        .ok_or_else(|| bad_argument(invocation))
}

/// `<n>ms` or plain seconds
fn delay_arg(invocation: &Invocation) -> Result<Duration, SupplyError> {
    let arg = invocation
        .first_arg()
        .ok_or_else(|| bad_argument(invocation))?;

    let seconds = match arg.strip_suffix("ms") {
        Some(ms) => ms.parse::<f64>().map(|ms| ms / 1000.0),
        None => arg.parse::<f64>(),
    }
    .map_err(|_| bad_argument(invocation))?;

    Duration::try_from_secs_f64(seconds).map_err(|_| SupplyError::OutOfRange {
        operation: invocation.operation(),
        value: arg.to_string(),
    })
}

fn channel_arg(invocation: &Invocation, channels: u8) -> Result<u8, SupplyError> {
    let arg = invocation
        .first_arg()
        .ok_or_else(|| bad_argument(invocation))?;
    let upper = arg.to_ascii_uppercase();
    let channel = upper
        .strip_prefix("CH")
        .unwrap_or(&upper)
        .parse::<u8>()
        .map_err(|_| bad_argument(invocation))?;

    if channel == 0 || channel > channels {
        return Err(SupplyError::OutOfRange {
            operation: invocation.operation(),
            value: arg.to_string(),
        });
    }
    Ok(channel)
}
