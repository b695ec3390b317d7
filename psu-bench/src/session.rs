//! Bench session: one engine, one command

use std::time::Instant;

use psu_regulation::{RegulationEngine, RegulationMode};
use psu_sim::{NoiseModel, ScheduleConfig, TickSchedule};
use psu_transport::Transport;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Command, RunArgs};
use crate::config::BenchConfig;
use crate::error::BenchError;

/// Load configuration, open the transport and execute the command
pub async fn run(cli: Cli) -> Result<(), BenchError> {
    let mut config = BenchConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let transport = config.transport.open(&config.supply);
    if !transport.is_connected() {
        warn!("{} is not connected", transport.describe());
    }
    let mut engine = RegulationEngine::with_config(transport, config.engine.clone());

    execute(&mut engine, &cli.command, &config).await
}

/// Execute one command against an engine
pub async fn execute<T: Transport>(
    engine: &mut RegulationEngine<T>,
    command: &Command,
    config: &BenchConfig,
) -> Result<(), BenchError> {
    match command {
        Command::SetVoltage { volts } => {
            engine.request_voltage(*volts)?;
            println!("{:.3} V", engine.state().requested_voltage);
        }
        Command::SetCurrent { amps } => {
            engine.request_current(*amps)?;
            println!("{:.3} A", engine.state().requested_current);
        }
        Command::Identify => {
            let identity = engine.identify()?;
            println!("{}", identity);
        }
        Command::SelfTest => {
            let report = engine.self_test()?;
            if !report.passed() {
                return Err(BenchError::SelfTestFailed {
                    code: report.code,
                    detail: report.detail,
                });
            }
            println!("self test passed");
        }
        Command::Reset => {
            engine.reset_device()?;
            println!("reset");
        }
        Command::Run(args) => {
            prepare(engine, args)?;
            let noise = NoiseModel::new(config.noise.clone());
            let result = run_loop(engine, noise, config.schedule, args.ticks).await;

            if args.output {
                match (engine.set_output_enabled(false), &result) {
                    (Err(e), Err(_)) => warn!("Failed to switch the output off: {}", e),
                    (switched_off, _) => switched_off?,
                }
            }
            let polls = result?;
            info!("Stopped after {} polls", polls);
        }
    }
    Ok(())
}

/// Apply the setpoints given for a run
fn prepare<T: Transport>(
    engine: &mut RegulationEngine<T>,
    args: &RunArgs,
) -> Result<(), BenchError> {
    if let Some(volts) = args.voltage {
        engine.request_voltage(volts)?;
    }
    if let Some(amps) = args.current {
        engine.request_current(amps)?;
    }
    if let Some(mode) = args.hold {
        engine.set_regulation_mode(mode);
    }
    if let Some(watts) = args.power {
        engine.set_constant_power(true);
        engine.request_power(watts)?;
        let held = match engine.state().regulation_mode {
            RegulationMode::ConstantVoltage => "voltage",
            RegulationMode::ConstantCurrent => "current",
        };
        info!("Holding {} W with {} fixed", watts, held);
    }
    if args.output {
        engine.set_output_enabled(true)?;
    }
    Ok(())
}

/// Poll and inject noise on independent timers
///
/// Returns the number of polls made. Stops after `max_polls` when given,
/// otherwise on Ctrl-C.
pub async fn run_loop<T: Transport>(
    engine: &mut RegulationEngine<T>,
    mut noise: NoiseModel,
    schedule: ScheduleConfig,
    max_polls: Option<u64>,
) -> Result<u64, BenchError> {
    let mut schedule = TickSchedule::new(schedule, Instant::now());
    let mut polls = 0u64;

    info!(
        "Polling every {:?}, noise {} every {:?}",
        schedule.poll_interval(),
        noise.mode().name(),
        schedule.noise_interval()
    );

    if max_polls == Some(0) {
        return Ok(0);
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let deadline = tokio::time::Instant::from_std(schedule.next_deadline());

        tokio::select! {
            signal = &mut shutdown => {
                signal.map_err(BenchError::Signal)?;
                info!("Interrupted");
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                let due = schedule.due(Instant::now());

                if due.noise {
                    noise.tick(engine)?;
                }

                if due.poll {
                    engine.poll_actual();
                    polls += 1;
                    let snapshot = engine.snapshot();
                    debug!("Poll {}", polls);
                    println!("{}", snapshot.summary());

                    if max_polls.is_some_and(|max| polls >= max) {
                        break;
                    }
                }
            }
        }
    }

    Ok(polls)
}
