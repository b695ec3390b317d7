//! Regulation engine
//!
//! Keeps the channel state consistent and drives the command protocol on
//! every accepted change. Every change request is validated first; a rejected
//! request changes nothing and sends nothing.

use std::time::Duration;

use psu_protocol::{CommandProtocol, Identity, OutputEncoding, SelfTestReport};
use psu_transport::{BoxedTransport, Transport, TransportKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RegulationError, ValidationError};
use crate::state::{
    Axis, ChannelSnapshot, ChannelState, Envelope, PollReading, Reading, RegulationMode,
};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial device envelope
    pub envelope: Envelope,
    /// How the device spells on/off
    pub output_encoding: OutputEncoding,
    /// Seed for simulated sentinel readings
    pub sentinel_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            envelope: Envelope::default(),
            output_encoding: OutputEncoding::Word,
            sentinel_seed: 0x5EED,
        }
    }
}

/// What `poll_actual` substitutes for a failed read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelPolicy {
    /// A reproducibly random negative value (simulation only)
    RandomNegative,
    /// An explicit "unavailable" reading
    Unavailable,
}

impl SentinelPolicy {
    /// Random placeholders stay behind the simulated transports
    pub fn for_transport(kind: TransportKind) -> Self {
        if kind.is_hardware() {
            SentinelPolicy::Unavailable
        } else {
            SentinelPolicy::RandomNegative
        }
    }
}

/// The regulation engine
///
/// Owns one [`CommandProtocol`], which owns one transport. All operations run
/// on the caller's thread; the engine is never shared.
pub struct RegulationEngine<T = BoxedTransport> {
    protocol: CommandProtocol<T>,
    state: ChannelState,
    output_encoding: OutputEncoding,
    sentinel_rng: StdRng,
}

impl<T: Transport> RegulationEngine<T> {
    /// Create an engine with default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, EngineConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(transport: T, config: EngineConfig) -> Self {
        info!(
            "Regulation engine on {} (envelope {} V / {} A / {} W)",
            transport.describe(),
            config.envelope.max_voltage,
            config.envelope.max_current,
            config.envelope.max_power
        );

        Self {
            protocol: CommandProtocol::new(transport),
            state: ChannelState::new(config.envelope),
            output_encoding: config.output_encoding,
            sentinel_rng: StdRng::seed_from_u64(config.sentinel_seed),
        }
    }

    /// Current channel state
    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Read-only copy of the channel state for display
    pub fn snapshot(&self) -> ChannelSnapshot {
        self.state.snapshot()
    }

    /// The transport in use
    pub fn transport(&self) -> &T {
        self.protocol.transport()
    }

    /// Mutable access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        self.protocol.transport_mut()
    }

    /// Direct protocol access for status and channel commands
    ///
    /// Setpoint commands sent this way bypass the channel state.
    pub fn protocol_mut(&mut self) -> &mut CommandProtocol<T> {
        &mut self.protocol
    }

    /// Bind a new transport and return the old one
    ///
    /// Channel state is kept as is.
    pub fn replace_transport(&mut self, transport: T) -> T {
        info!(
            "Switching transport from {} to {}",
            self.protocol.transport().describe(),
            transport.describe()
        );
        self.protocol.replace_transport(transport)
    }

    /// Request a new output voltage
    pub fn request_voltage(&mut self, volts: f64) -> Result<(), RegulationError> {
        let volts = validate_request(Axis::Voltage, volts, self.state.envelope.max_voltage)?;

        if self.state.power_is_constant {
            let amps = self.follow_power(Axis::Current, volts);
            return self.apply_pair(volts, amps);
        }

        let clamped = clamp_to_power(
            volts,
            self.state.requested_current,
            self.state.envelope.max_power,
        );
        if clamped < volts {
            debug!("Voltage {} clamped to {} by the power envelope", volts, clamped);
        }
        self.apply_voltage(clamped)?;
        self.state.requested_power = self.state.requested_voltage * self.state.requested_current;
        Ok(())
    }

    /// Request a new output current
    pub fn request_current(&mut self, amps: f64) -> Result<(), RegulationError> {
        let amps = validate_request(Axis::Current, amps, self.state.envelope.max_current)?;

        if self.state.power_is_constant {
            let volts = self.follow_power(Axis::Voltage, amps);
            return self.apply_pair(volts, amps);
        }

        let clamped = clamp_to_power(
            amps,
            self.state.requested_voltage,
            self.state.envelope.max_power,
        );
        if clamped < amps {
            debug!("Current {} clamped to {} by the power envelope", amps, clamped);
        }
        self.apply_current(clamped)?;
        self.state.requested_power = self.state.requested_voltage * self.state.requested_current;
        Ok(())
    }

    /// Request a new power target
    ///
    /// Only accepted while power is held constant. The axis that is not held
    /// is recomputed from the target.
    pub fn request_power(&mut self, watts: f64) -> Result<(), RegulationError> {
        if !self.state.power_is_constant {
            return Err(ValidationError::ConstantPowerDisabled.into());
        }
        let watts = validate_request(Axis::Power, watts, self.state.envelope.max_power)?;

        match self.state.regulation_mode {
            RegulationMode::ConstantVoltage => {
                let amps = derive_axis(
                    watts,
                    self.state.requested_voltage,
                    self.state.envelope.max_current,
                    self.state.envelope.max_power,
                );
                self.apply_current(amps)?;
            }
            RegulationMode::ConstantCurrent => {
                let volts = derive_axis(
                    watts,
                    self.state.requested_current,
                    self.state.envelope.max_voltage,
                    self.state.envelope.max_power,
                );
                self.apply_voltage(volts)?;
            }
        }

        self.state.requested_power = watts;
        Ok(())
    }

    /// Hold power constant (or release it)
    ///
    /// Enabling captures the present `V * I` as the power target; requested
    /// voltage and current are left alone.
    pub fn set_constant_power(&mut self, enabled: bool) {
        if self.state.power_is_constant != enabled {
            info!("Constant power {}", if enabled { "enabled" } else { "disabled" });
        }
        self.state.power_is_constant = enabled;
        self.state.requested_power = self.state.requested_voltage * self.state.requested_current;
    }

    /// Choose which axis stays fixed under constant power
    pub fn set_regulation_mode(&mut self, mode: RegulationMode) {
        if self.state.regulation_mode != mode {
            info!("Regulation mode set to {:?}", mode);
        }
        self.state.regulation_mode = mode;
    }

    /// Switch the output on or off
    pub fn set_output_enabled(&mut self, on: bool) -> Result<(), RegulationError> {
        self.protocol.set_output(on, self.output_encoding)?;
        self.state.output_enabled = on;
        info!("Output {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    /// Read back the actual output
    ///
    /// Never fails: a query that errors or returns something non-numeric
    /// leaves a sentinel in place of that reading so a polling loop keeps
    /// running.
    pub fn poll_actual(&mut self) -> PollReading {
        let voltage = match self.protocol.measure_voltage() {
            Ok(v) => Reading::Measured(v),
            Err(e) => {
                warn!("Voltage read failed: {}", e);
                self.sentinel()
            }
        };

        let current = match self.protocol.measure_current() {
            Ok(i) => Reading::Measured(i),
            Err(e) => {
                warn!("Current read failed: {}", e);
                self.sentinel()
            }
        };

        let mode = match self.protocol.output_mode() {
            Ok(mode) => Some(mode),
            Err(e) => {
                warn!("Output mode read failed: {}", e);
                None
            }
        };

        self.state.actual_voltage = voltage;
        self.state.actual_current = current;
        self.state.actual_mode = mode.clone();

        PollReading {
            voltage,
            current,
            mode,
        }
    }

    /// Adjust any subset of the envelope ceilings
    ///
    /// Lowering a ceiling below a live request re-clamps it immediately and
    /// sends the matching SET commands, so the envelope invariant always holds.
    pub fn set_envelope(
        &mut self,
        max_voltage: Option<f64>,
        max_current: Option<f64>,
        max_power: Option<f64>,
    ) -> Result<(), RegulationError> {
        let current = self.state.envelope;
        let envelope = Envelope::new(
            max_voltage.unwrap_or(current.max_voltage),
            max_current.unwrap_or(current.max_current),
            max_power.unwrap_or(current.max_power),
        )?;

        let mut volts = self.state.requested_voltage.min(envelope.max_voltage);
        let mut amps = self.state.requested_current.min(envelope.max_current);
        if volts * amps > envelope.max_power {
            // Give way on the axis that follows the other
            if self.state.power_is_constant
                && self.state.regulation_mode == RegulationMode::ConstantCurrent
            {
                volts = clamp_to_power(volts, amps, envelope.max_power);
            } else {
                amps = clamp_to_power(amps, volts, envelope.max_power);
            }
        }

        // Both axes can only go down here, so voltage first is safe
        if volts != self.state.requested_voltage {
            debug!("Envelope change re-clamps voltage to {}", volts);
            self.apply_voltage(volts)?;
        }
        if amps != self.state.requested_current {
            debug!("Envelope change re-clamps current to {}", amps);
            self.apply_current(amps)?;
        }

        self.state.envelope = envelope;
        self.state.requested_power = if self.state.power_is_constant {
            self.state.requested_power.min(envelope.max_power)
        } else {
            volts * amps
        };

        info!(
            "Envelope set to {} V / {} A / {} W",
            envelope.max_voltage, envelope.max_current, envelope.max_power
        );
        Ok(())
    }

    /// Reset the instrument and return the channel to its initial state
    ///
    /// The envelope and the constant power settings survive the reset.
    pub fn reset_device(&mut self) -> Result<(), RegulationError> {
        self.protocol.reset()?;

        let mut state = ChannelState::new(self.state.envelope);
        state.regulation_mode = self.state.regulation_mode;
        state.power_is_constant = self.state.power_is_constant;
        self.state = state;

        info!("Device reset");
        Ok(())
    }

    /// Query the instrument identification
    pub fn identify(&mut self) -> Result<Identity, RegulationError> {
        Ok(self.protocol.identify()?)
    }

    /// Run the instrument self test
    pub fn self_test(&mut self) -> Result<SelfTestReport, RegulationError> {
        Ok(self.protocol.self_test()?)
    }

    /// Configure overcurrent protection and its trip delay
    pub fn configure_overcurrent_protection(
        &mut self,
        enabled: bool,
        delay: Duration,
    ) -> Result<(), RegulationError> {
        self.protocol
            .set_overcurrent_protection(enabled, self.output_encoding)?;
        if enabled {
            self.protocol.set_overcurrent_delay(delay)?;
        }
        Ok(())
    }

    /// Value of `axis` that keeps the power target given the other axis
    fn follow_power(&self, axis: Axis, other: f64) -> f64 {
        derive_axis(
            self.state.requested_power,
            other,
            self.state.envelope.max(axis),
            self.state.envelope.max_power,
        )
    }

    /// Apply both setpoints, whichever is decreasing first
    ///
    /// When voltage rises, current (which can only fall or hold) goes first;
    /// otherwise voltage goes first. Every intermediate pair stays inside the
    /// envelope that held before the change.
    fn apply_pair(&mut self, volts: f64, amps: f64) -> Result<(), RegulationError> {
        if volts > self.state.requested_voltage {
            self.apply_current(amps)?;
            self.apply_voltage(volts)
        } else {
            self.apply_voltage(volts)?;
            self.apply_current(amps)
        }
    }

    fn apply_voltage(&mut self, volts: f64) -> Result<(), RegulationError> {
        self.protocol.set_voltage(volts)?;
        self.state.requested_voltage = volts;
        Ok(())
    }

    fn apply_current(&mut self, amps: f64) -> Result<(), RegulationError> {
        self.protocol.set_current(amps)?;
        self.state.requested_current = amps;
        Ok(())
    }

    fn sentinel(&mut self) -> Reading {
        match SentinelPolicy::for_transport(self.protocol.transport().kind()) {
            SentinelPolicy::RandomNegative => {
                Reading::Sentinel(-self.sentinel_rng.random_range(f64::EPSILON..1.0))
            }
            SentinelPolicy::Unavailable => Reading::Unavailable,
        }
    }
}

impl<T: Transport> std::fmt::Debug for RegulationEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegulationEngine")
            .field("transport", &self.protocol.transport().describe())
            .field("state", &self.state)
            .finish()
    }
}

/// Check a requested value against its limit, folding `-0.0` into `0.0`
fn validate_request(axis: Axis, value: f64, max: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { axis, value });
    }
    if value < 0.0 {
        return Err(ValidationError::Negative { axis, value });
    }
    if value > max {
        return Err(ValidationError::ExceedsMaximum { axis, value, max });
    }
    Ok(value + 0.0)
}

/// Largest value not above `value` whose product with `other` fits `max_power`
fn clamp_to_power(value: f64, other: f64, max_power: f64) -> f64 {
    if other <= 0.0 {
        return value;
    }
    let mut clamped = value.min(max_power / other);
    // Division can round up by an ulp
    while clamped > 0.0 && clamped * other > max_power {
        clamped = f64::from_bits(clamped.to_bits() - 1);
    }
    clamped
}

/// `power / fixed`, zero when the fixed axis is zero, capped by `max` and the envelope
fn derive_axis(power: f64, fixed: f64, max: f64, max_power: f64) -> f64 {
    if fixed <= 0.0 {
        return 0.0;
    }
    clamp_to_power((power / fixed).min(max), fixed, max_power)
}
