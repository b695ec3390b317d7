//! Bench Power Supply Simulation Library
//!
//! This crate provides a simulation layer for exercising the regulation
//! engine without a physical instrument. It includes:
//!
//! - **VirtualSupply**: a SCPI power supply driving a resistive load
//! - **SimulatedTransport**: a [`psu_transport::Transport`] wired to a virtual supply
//! - **NoiseModel**: seeded perturbation of requested voltage and current
//! - **TickSchedule**: independent poll and noise deadlines for a control loop
//!
//! # Example
//!
//! ```rust
//! use psu_regulation::RegulationEngine;
//! use psu_sim::{NoiseConfig, NoiseMode, NoiseModel, SimulatedTransport};
//!
//! let mut engine = RegulationEngine::new(SimulatedTransport::default());
//! engine.request_voltage(12.0).unwrap();
//! engine.request_current(2.0).unwrap();
//! engine.set_output_enabled(true).unwrap();
//!
//! // 12 V across the default 10 ohm load
//! let reading = engine.poll_actual();
//! assert_eq!(reading.mode.as_deref(), Some("CV"));
//!
//! let mut noise = NoiseModel::new(NoiseConfig {
//!     mode: NoiseMode::Additive,
//!     ..Default::default()
//! });
//! noise.tick(&mut engine).unwrap();
//! ```

pub mod error;
pub mod noise;
pub mod schedule;
pub mod supply;
pub mod transport;

pub use error::SupplyError;
pub use noise::{AxisFactors, NoiseConfig, NoiseMode, NoiseModel};
pub use schedule::{DueTicks, ScheduleConfig, TickSchedule};
pub use supply::{Measurement, OutputMode, VirtualSupply, VirtualSupplyConfig};
pub use transport::SimulatedTransport;
