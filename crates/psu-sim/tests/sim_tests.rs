//! Integration tests for the simulation layer
//!
//! These tests run the regulation engine against a virtual supply and check:
//! - Setpoints reach the instrument and readings come back from the load model
//! - Noise injection keeps every invariant of a manual change
//! - Status, identification and self test over the simulated link
//! - Transport replacement mid-session

use std::time::{Duration, Instant};

use psu_regulation::{Reading, RegulationEngine, RegulationMode};
use psu_sim::{
    NoiseConfig, NoiseMode, NoiseModel, ScheduleConfig, SimulatedTransport, TickSchedule,
    VirtualSupplyConfig,
};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub fn sim_engine() -> RegulationEngine<SimulatedTransport> {
        RegulationEngine::new(SimulatedTransport::default())
    }

    pub fn sim_engine_with(config: VirtualSupplyConfig) -> RegulationEngine<SimulatedTransport> {
        RegulationEngine::new(SimulatedTransport::from_config(config))
    }

    pub fn noise(mode: NoiseMode, seed: u64) -> NoiseModel {
        NoiseModel::new(NoiseConfig {
            mode,
            seed,
            ..Default::default()
        })
    }

    /// Engine at `v` / `i` with the output on
    pub fn running(v: f64, i: f64) -> RegulationEngine<SimulatedTransport> {
        let mut engine = sim_engine();
        engine.request_voltage(v).unwrap();
        engine.request_current(i).unwrap();
        engine.set_output_enabled(true).unwrap();
        engine
    }
}

// ============================================================================
// Engine Against the Virtual Supply
// ============================================================================

mod engine_on_sim {
    use super::*;

    #[test]
    fn test_setpoints_reach_instrument() {
        let engine = helpers::running(24.0, 3.0);

        let supply = engine.transport().supply();
        assert_eq!(supply.set_voltage(), 24.0);
        assert_eq!(supply.set_current(), 3.0);
        assert!(supply.output_enabled());
    }

    #[test]
    fn test_poll_constant_voltage() {
        let mut engine = helpers::running(12.0, 5.0);

        let reading = engine.poll_actual();

        assert_eq!(reading.voltage, Reading::Measured(12.0));
        assert_eq!(reading.current, Reading::Measured(1.2));
        assert_eq!(reading.mode.as_deref(), Some("CV"));
    }

    #[test]
    fn test_poll_constant_current() {
        let mut engine = helpers::running(40.0, 2.0);

        let reading = engine.poll_actual();

        assert_eq!(reading.voltage, Reading::Measured(20.0));
        assert_eq!(reading.current, Reading::Measured(2.0));
        assert_eq!(reading.mode.as_deref(), Some("CC"));
        assert_eq!(engine.snapshot().actual_power, Some(40.0));
    }

    #[test]
    fn test_poll_with_output_off() {
        let mut engine = helpers::sim_engine();
        engine.request_voltage(12.0).unwrap();

        let reading = engine.poll_actual();

        assert_eq!(reading.voltage, Reading::Measured(0.0));
        assert_eq!(reading.mode.as_deref(), Some("OFF"));
    }

    #[test]
    fn test_link_down_gives_sentinels() {
        let mut engine = helpers::running(12.0, 5.0);
        engine.transport_mut().set_link_up(false);

        let reading = engine.poll_actual();

        assert!(matches!(reading.voltage, Reading::Sentinel(v) if v < 0.0));
        assert!(matches!(reading.current, Reading::Sentinel(v) if v < 0.0));
        assert_eq!(reading.mode, None);
        assert!(engine.request_voltage(10.0).is_err());
        assert_eq!(engine.state().requested_voltage, 12.0);
    }

    #[test]
    fn test_constant_power_on_sim() {
        let mut engine = helpers::running(40.0, 50.0);
        engine.set_constant_power(true);

        engine.request_voltage(60.0).unwrap();

        let supply = engine.transport().supply();
        assert_eq!(supply.set_voltage(), 60.0);
        assert!((supply.set_current() - 2000.0 / 60.0).abs() < 1e-9);
        let tail: Vec<_> = supply.received().iter().rev().take(2).rev().cloned().collect();
        assert!(tail[0].starts_with("CURR "));
        assert_eq!(tail[1], "VOLT 60");
    }

    #[test]
    fn test_reset_device() {
        let mut engine = helpers::running(12.0, 5.0);

        engine.reset_device().unwrap();

        assert!(!engine.transport().supply().output_enabled());
        assert_eq!(engine.transport().supply().set_voltage(), 0.0);
        assert_eq!(engine.state().requested_voltage, 0.0);
    }

    #[test]
    fn test_identify_and_self_test() {
        let mut engine = helpers::sim_engine();
        let id = engine.identify().unwrap();
        assert_eq!(id.manufacturer, "PSU-SIM");
        assert!(engine.self_test().unwrap().passed());

        let mut failing = helpers::sim_engine_with(VirtualSupplyConfig {
            self_test_failure: Some("output stage".into()),
            ..Default::default()
        });
        let report = failing.self_test().unwrap();
        assert!(!report.passed());
        assert_eq!(report.detail.as_deref(), Some("1,\"output stage\""));
    }

    #[test]
    fn test_overcurrent_protection() {
        let mut engine = helpers::sim_engine();

        engine
            .configure_overcurrent_protection(true, Duration::from_millis(40))
            .unwrap();

        let supply = engine.transport().supply();
        assert!(supply.ocp_enabled());
        assert_eq!(supply.ocp_delay(), Duration::from_millis(40));
        assert!(engine.protocol_mut().overcurrent_protection().unwrap());
    }

    #[test]
    fn test_event_status_and_channel() {
        let mut engine = helpers::sim_engine_with(VirtualSupplyConfig {
            channels: 2,
            ..Default::default()
        });
        let protocol = engine.protocol_mut();

        protocol.select_channel("CH2").unwrap();
        assert_eq!(protocol.selected_channel().unwrap(), "CH2");

        protocol.select_channel("CH9").unwrap();
        assert_eq!(protocol.event_status().unwrap(), 16);
        assert_eq!(protocol.event_status().unwrap(), 0);

        protocol.select_channel("CH9").unwrap();
        protocol.clear_status().unwrap();
        assert_eq!(protocol.event_status().unwrap(), 0);
    }

    #[test]
    fn test_replace_transport() {
        let mut engine = helpers::running(12.0, 5.0);

        let old = engine.replace_transport(SimulatedTransport::default());

        assert!(old.supply().output_enabled());
        assert!(engine.state().output_enabled);
        assert!(!engine.transport().supply().output_enabled());

        engine.request_voltage(6.0).unwrap();
        assert_eq!(engine.transport().supply().set_voltage(), 6.0);
    }
}

// ============================================================================
// Noise Injection
// ============================================================================

mod noise {
    use super::*;

    #[test]
    fn test_none_mode_is_idempotent() {
        let mut engine = helpers::running(12.0, 5.0);
        let before = engine.state().clone();
        let received = engine.transport().supply().received().len();
        let mut noise = helpers::noise(NoiseMode::None, 1);

        for _ in 0..50 {
            noise.tick(&mut engine).unwrap();
        }

        assert_eq!(engine.state(), &before);
        assert_eq!(engine.transport().supply().received().len(), received);
    }

    #[test]
    fn test_additive_noise_moves_setpoints() {
        let mut engine = helpers::running(12.0, 5.0);
        let mut noise = helpers::noise(NoiseMode::Additive, 3);

        noise.tick(&mut engine).unwrap();

        let state = engine.state();
        assert!((state.requested_voltage - 12.0).abs() <= 0.05);
        assert!((state.requested_current - 5.0).abs() <= 0.05);
        assert_eq!(
            engine.transport().supply().set_voltage(),
            state.requested_voltage
        );
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = helpers::running(12.0, 5.0);
        let mut b = helpers::running(12.0, 5.0);
        let mut noise_a = helpers::noise(NoiseMode::Multiplicative, 99);
        let mut noise_b = helpers::noise(NoiseMode::Multiplicative, 99);

        for _ in 0..20 {
            noise_a.tick(&mut a).unwrap();
            noise_b.tick(&mut b).unwrap();
        }

        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn test_noise_at_zero_is_skipped() {
        let mut engine = helpers::sim_engine();
        engine.set_output_enabled(true).unwrap();
        let mut noise = helpers::noise(NoiseMode::Additive, 5);

        for _ in 0..20 {
            noise.tick(&mut engine).unwrap();
        }

        assert!(engine.state().requested_voltage >= 0.0);
        assert!(engine.state().requested_current >= 0.0);
    }

    #[test]
    fn test_noise_in_constant_power_holds_target() {
        let mut engine = helpers::running(40.0, 50.0);
        engine.set_constant_power(true);
        engine.set_regulation_mode(RegulationMode::ConstantVoltage);
        let mut noise = helpers::noise(NoiseMode::Additive, 11);

        for _ in 0..10 {
            noise.tick(&mut engine).unwrap();
        }

        assert_eq!(engine.state().requested_power, 2000.0);
        assert!(engine.state().within_envelope());
    }
}

// ============================================================================
// Scheduled Loop
// ============================================================================

mod scheduled_loop {
    use super::*;

    #[test]
    fn test_schedule_drives_poll_and_noise() {
        let mut engine = helpers::running(12.0, 5.0);
        let mut noise = helpers::noise(NoiseMode::Additive, 2);
        let start = Instant::now();
        let mut schedule = TickSchedule::new(
            ScheduleConfig {
                poll_interval_ms: 100,
                noise_interval_ms: 300,
            },
            start,
        );
        let mut polls = 0;

        for step in 1..=6 {
            let due = schedule.due(start + Duration::from_millis(step * 100));
            if due.noise {
                noise.tick(&mut engine).unwrap();
            }
            if due.poll {
                polls += 1;
                assert!(engine.poll_actual().voltage.is_measured());
            }
        }

        assert_eq!(polls, 6);
        assert_ne!(engine.state().requested_voltage, 12.0);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn noise_mode() -> impl Strategy<Value = NoiseMode> {
        prop_oneof![Just(NoiseMode::Additive), Just(NoiseMode::Multiplicative)]
    }

    proptest! {
        #[test]
        fn noise_never_breaks_envelope(
            v in 0.0f64..80.0,
            i in 0.0f64..120.0,
            mode in noise_mode(),
            seed in any::<u64>(),
            constant_power in any::<bool>(),
        ) {
            let mut engine = helpers::running(v, i);
            engine.set_constant_power(constant_power);
            let mut noise = helpers::noise(mode, seed);

            for _ in 0..25 {
                noise.tick(&mut engine).unwrap();
                prop_assert!(engine.state().within_envelope());
            }
        }

        #[test]
        fn load_model_is_consistent(v in 0.0f64..80.0, i in 0.0f64..120.0, ohms in 0.1f64..100.0) {
            let mut engine = helpers::running(v, i);
            engine.transport_mut().supply_mut().set_load(ohms);

            let m = engine.transport().supply().measure();
            let state = engine.state();
            prop_assert!(m.voltage <= state.requested_voltage + 1e-9);
            prop_assert!(m.current <= state.requested_current + 1e-9);
        }
    }
}
