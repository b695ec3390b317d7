//! Noise injection
//!
//! Perturbs the requested voltage and current on each tick to imitate
//! measurement jitter. Perturbed values go through the engine's normal
//! change-request path, so clamping and command issuance are identical to a
//! manual change.

use psu_regulation::{Axis, RegulationEngine, RegulationError};
use psu_transport::Transport;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How requested values are perturbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseMode {
    /// No perturbation
    #[default]
    None,
    /// `x + (u - 0.5) * factor`
    Additive,
    /// `x * (1 + (u - 0.5) * factor)`
    Multiplicative,
}

impl NoiseMode {
    pub const ALL: [NoiseMode; 3] = [
        NoiseMode::None,
        NoiseMode::Additive,
        NoiseMode::Multiplicative,
    ];

    /// Lowercase name as used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            NoiseMode::None => "none",
            NoiseMode::Additive => "additive",
            NoiseMode::Multiplicative => "multiplicative",
        }
    }

    /// Look up a mode by name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
    }
}

/// Per-axis noise factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisFactors {
    pub voltage: f64,
    pub current: f64,
}

impl AxisFactors {
    fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Current => self.current,
            _ => self.voltage,
        }
    }

    fn clamped(self, max: f64) -> Self {
        Self {
            voltage: clamp_factor(self.voltage, max),
            current: clamp_factor(self.current, max),
        }
    }
}

/// Noise configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub mode: NoiseMode,
    /// Additive factors, in volts and amps
    pub additive: AxisFactors,
    /// Multiplicative factors, as fractions of the requested value
    pub multiplicative: AxisFactors,
    /// Ceiling for additive factors
    pub additive_max: f64,
    /// Ceiling for multiplicative factors
    pub multiplicative_max: f64,
    /// RNG seed; the same seed gives the same sequence of perturbations
    pub seed: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            mode: NoiseMode::None,
            additive: AxisFactors {
                voltage: 0.1,
                current: 0.1,
            },
            multiplicative: AxisFactors {
                voltage: 0.02,
                current: 0.02,
            },
            additive_max: 1.0,
            multiplicative_max: 0.4,
            seed: 0,
        }
    }
}

/// Seeded noise generator driven once per tick
#[derive(Debug)]
pub struct NoiseModel {
    mode: NoiseMode,
    additive: AxisFactors,
    multiplicative: AxisFactors,
    additive_max: f64,
    multiplicative_max: f64,
    rng: StdRng,
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self::new(NoiseConfig::default())
    }
}

impl NoiseModel {
    /// Build a model; factors outside `[0, max]` are clamped
    pub fn new(config: NoiseConfig) -> Self {
        let additive_max = clamp_factor(config.additive_max, f64::MAX);
        let multiplicative_max = clamp_factor(config.multiplicative_max, f64::MAX);

        Self {
            mode: config.mode,
            additive: config.additive.clamped(additive_max),
            multiplicative: config.multiplicative.clamped(multiplicative_max),
            additive_max,
            multiplicative_max,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    pub fn mode(&self) -> NoiseMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: NoiseMode) {
        self.mode = mode;
    }

    /// Factor in effect for `axis` under `mode` (zero for `None`)
    pub fn factor(&self, mode: NoiseMode, axis: Axis) -> f64 {
        match mode {
            NoiseMode::None => 0.0,
            NoiseMode::Additive => self.additive.get(axis),
            NoiseMode::Multiplicative => self.multiplicative.get(axis),
        }
    }

    /// Set one factor, clamped to the ceiling for its mode
    pub fn set_factor(&mut self, mode: NoiseMode, axis: Axis, value: f64) {
        let (factors, max) = match mode {
            NoiseMode::None => return,
            NoiseMode::Additive => (&mut self.additive, self.additive_max),
            NoiseMode::Multiplicative => (&mut self.multiplicative, self.multiplicative_max),
        };
        let value = clamp_factor(value, max);
        match axis {
            Axis::Voltage => factors.voltage = value,
            Axis::Current => factors.current = value,
            Axis::Power => {}
        }
    }

    /// Perturb one value
    pub fn perturb(&mut self, value: f64, axis: Axis) -> f64 {
        let factor = self.factor(self.mode, axis);
        match self.mode {
            NoiseMode::None => value,
            NoiseMode::Additive => value + (self.rng.random::<f64>() - 0.5) * factor,
            NoiseMode::Multiplicative => {
                value * (1.0 + (self.rng.random::<f64>() - 0.5) * factor)
            }
        }
    }

    /// Apply one tick of noise to the engine
    ///
    /// Does nothing while the output is off. A perturbed value the engine
    /// rejects is skipped; protocol errors are returned.
    pub fn tick<T: Transport>(
        &mut self,
        engine: &mut RegulationEngine<T>,
    ) -> Result<(), RegulationError> {
        if self.mode == NoiseMode::None || !engine.state().output_enabled {
            return Ok(());
        }

        let volts = self.perturb(engine.state().requested_voltage, Axis::Voltage);
        skip_rejected(engine.request_voltage(volts), Axis::Voltage, volts)?;

        let amps = self.perturb(engine.state().requested_current, Axis::Current);
        skip_rejected(engine.request_current(amps), Axis::Current, amps)?;

        Ok(())
    }
}

fn skip_rejected(
    result: Result<(), RegulationError>,
    axis: Axis,
    value: f64,
) -> Result<(), RegulationError> {
    match result {
        Err(RegulationError::Validation(e)) => {
            debug!("Noise on {} skipped ({}): {}", axis, value, e);
            Ok(())
        }
        other => other,
    }
}

fn clamp_factor(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, max)
}
