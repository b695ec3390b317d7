//! Channel state tracking

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One of the three regulated quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Volts
    Voltage,
    /// Amps
    Current,
    /// Watts
    Power,
}

impl Axis {
    /// SI unit symbol
    pub fn unit(&self) -> &'static str {
        match self {
            Axis::Voltage => "V",
            Axis::Current => "A",
            Axis::Power => "W",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::Voltage => "voltage",
            Axis::Current => "current",
            Axis::Power => "power",
        })
    }
}

/// Which axis is held fixed while power is adjusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegulationMode {
    /// Voltage is held; current follows the power target
    #[default]
    ConstantVoltage,
    /// Current is held; voltage follows the power target
    ConstantCurrent,
}

impl RegulationMode {
    /// The axis held fixed in this mode
    pub fn held_axis(&self) -> Axis {
        match self {
            RegulationMode::ConstantVoltage => Axis::Voltage,
            RegulationMode::ConstantCurrent => Axis::Current,
        }
    }
}

/// Combined regulation state
///
/// `VariablePower` is the initial state. Transitions happen only through
/// `set_constant_power` and `set_regulation_mode`, and no state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegulationState {
    /// Voltage and current are independently settable within the envelope
    VariablePower,
    /// Power is held constant with the given axis fixed
    ConstantPower(RegulationMode),
}

impl RegulationState {
    /// Short label for display (`VP`, `CP/CV`, `CP/CC`)
    pub fn label(&self) -> &'static str {
        match self {
            RegulationState::VariablePower => "VP",
            RegulationState::ConstantPower(RegulationMode::ConstantVoltage) => "CP/CV",
            RegulationState::ConstantPower(RegulationMode::ConstantCurrent) => "CP/CC",
        }
    }
}

/// The device power envelope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Maximum voltage in volts
    pub max_voltage: f64,
    /// Maximum current in amps
    pub max_current: f64,
    /// Maximum power in watts
    pub max_power: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            max_voltage: 80.0,
            max_current: 120.0,
            max_power: 3000.0,
        }
    }
}

impl Envelope {
    /// Create an envelope, rejecting non-positive or non-finite ceilings
    pub fn new(max_voltage: f64, max_current: f64, max_power: f64) -> Result<Self, ValidationError> {
        let envelope = Self {
            max_voltage,
            max_current,
            max_power,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Check every ceiling is positive and finite
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (axis, value) in [
            (Axis::Voltage, self.max_voltage),
            (Axis::Current, self.max_current),
            (Axis::Power, self.max_power),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ValidationError::InvalidEnvelope { axis, value });
            }
        }
        Ok(())
    }

    /// Ceiling for one axis
    pub fn max(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Voltage => self.max_voltage,
            Axis::Current => self.max_current,
            Axis::Power => self.max_power,
        }
    }

    /// Whether a (V, I) pair lies inside the envelope
    pub fn admits(&self, volts: f64, amps: f64) -> bool {
        volts >= 0.0
            && amps >= 0.0
            && volts <= self.max_voltage
            && amps <= self.max_current
            && volts * amps <= self.max_power
    }
}

/// A value read back from the instrument
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Reading {
    /// Value reported by the instrument
    Measured(f64),
    /// Placeholder substituted for a failed read in simulation; always negative
    Sentinel(f64),
    /// No usable value
    #[default]
    Unavailable,
}

impl Reading {
    /// Numeric value, if there is one to display
    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Measured(v) | Reading::Sentinel(v) => Some(*v),
            Reading::Unavailable => None,
        }
    }

    /// Returns true if the instrument actually reported this value
    pub fn is_measured(&self) -> bool {
        matches!(self, Reading::Measured(_))
    }

    /// Value reported by the instrument; sentinels yield `None`
    pub fn measured(&self) -> Option<f64> {
        match self {
            Reading::Measured(v) => Some(*v),
            _ => None,
        }
    }

    /// Format for display with the given unit
    pub fn display(&self, unit: &str) -> String {
        match self {
            Reading::Measured(v) => format!("{:.3} {}", v, unit),
            Reading::Sentinel(v) => format!("{:.3} {} (?)", v, unit),
            Reading::Unavailable => "---".to_string(),
        }
    }
}

/// Readings gathered by one poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollReading {
    /// Output voltage
    pub voltage: Reading,
    /// Output current
    pub current: Reading,
    /// Regulation mode reported by the output (`CV`, `CC`, ...)
    pub mode: Option<String>,
}

impl PollReading {
    /// Output power, when both readings were measured
    pub fn power(&self) -> Option<f64> {
        Some(self.voltage.measured()? * self.current.measured()?)
    }
}

/// State of the single regulated output channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    /// Requested voltage setpoint
    pub requested_voltage: f64,
    /// Requested current setpoint
    pub requested_current: f64,
    /// `V * I` in variable power; the held target in constant power
    pub requested_power: f64,
    /// Device envelope
    pub envelope: Envelope,
    /// Axis held fixed under constant power
    pub regulation_mode: RegulationMode,
    /// Whether power is held constant
    pub power_is_constant: bool,
    /// Output switch
    pub output_enabled: bool,
    /// Last voltage read back
    pub actual_voltage: Reading,
    /// Last current read back
    pub actual_current: Reading,
    /// Last output mode read back
    pub actual_mode: Option<String>,
}

impl ChannelState {
    /// Fresh state: all requests at zero, output disabled
    pub fn new(envelope: Envelope) -> Self {
        Self {
            requested_voltage: 0.0,
            requested_current: 0.0,
            requested_power: 0.0,
            envelope,
            regulation_mode: RegulationMode::default(),
            power_is_constant: false,
            output_enabled: false,
            actual_voltage: Reading::Unavailable,
            actual_current: Reading::Unavailable,
            actual_mode: None,
        }
    }

    /// Current position in the regulation state machine
    pub fn regulation_state(&self) -> RegulationState {
        if self.power_is_constant {
            RegulationState::ConstantPower(self.regulation_mode)
        } else {
            RegulationState::VariablePower
        }
    }

    /// Whether the requested pair lies inside the envelope
    pub fn within_envelope(&self) -> bool {
        self.envelope
            .admits(self.requested_voltage, self.requested_current)
    }

    /// Read-only copy for display
    pub fn snapshot(&self) -> ChannelSnapshot {
        let actual_power = match (self.actual_voltage.measured(), self.actual_current.measured()) {
            (Some(v), Some(i)) => Some(v * i),
            _ => None,
        };

        ChannelSnapshot {
            requested_voltage: self.requested_voltage,
            requested_current: self.requested_current,
            requested_power: self.requested_power,
            actual_voltage: self.actual_voltage,
            actual_current: self.actual_current,
            actual_power,
            actual_mode: self.actual_mode.clone(),
            mode: self.regulation_state(),
            power_is_constant: self.power_is_constant,
            output_enabled: self.output_enabled,
            envelope: self.envelope,
        }
    }
}

/// Read-only view of channel state handed to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub requested_voltage: f64,
    pub requested_current: f64,
    pub requested_power: f64,
    pub actual_voltage: Reading,
    pub actual_current: Reading,
    /// `actual_voltage * actual_current` when both were measured
    pub actual_power: Option<f64>,
    pub actual_mode: Option<String>,
    pub mode: RegulationState,
    pub power_is_constant: bool,
    pub output_enabled: bool,
    pub envelope: Envelope,
}

impl ChannelSnapshot {
    /// One-line summary for logs and terminals
    pub fn summary(&self) -> String {
        format!(
            "[{}] set {:.3} V / {:.3} A / {:.1} W | out {} | read {} / {}{}",
            self.mode.label(),
            self.requested_voltage,
            self.requested_current,
            self.requested_power,
            if self.output_enabled { "ON" } else { "OFF" },
            self.actual_voltage.display(Axis::Voltage.unit()),
            self.actual_current.display(Axis::Current.unit()),
            self.actual_mode
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default(),
        )
    }
}
