//! Command line interface

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use psu_regulation::RegulationMode;
use psu_sim::NoiseMode;
use psu_transport::SerialConfig;

use crate::config::{BenchConfig, TransportConfig};

#[derive(Parser, Debug)]
#[command(
    name = "psu-bench",
    version,
    about = "Drive a bench power supply over serial, TCP or a simulated link",
    arg_required_else_help = true
)]
pub struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Serial port (e.g. COM8 or /dev/ttyACM0).
    #[arg(long, global = true, value_name = "PORT", conflicts_with_all = ["tcp", "sim"])]
    pub serial: Option<String>,

    /// Serial baud rate (with --serial).
    #[arg(long, global = true, value_name = "BAUD", requires = "serial")]
    pub baud: Option<u32>,

    /// Instrument network address.
    #[arg(long, global = true, value_name = "HOST[:PORT]", conflicts_with = "sim")]
    pub tcp: Option<String>,

    /// Use the built-in virtual supply.
    #[arg(long, global = true, default_value_t = false)]
    pub sim: bool,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Set the output voltage.
    SetVoltage {
        #[arg(value_name = "VOLTS")]
        volts: f64,
    },

    /// Set the output current limit.
    SetCurrent {
        #[arg(value_name = "AMPS")]
        amps: f64,
    },

    /// Print the instrument identification.
    Identify,

    /// Run the instrument self test.
    SelfTest,

    /// Reset the instrument to power-on defaults.
    Reset,

    /// Poll the supply on a timer, optionally injecting noise.
    Run(RunArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Default)]
pub struct RunArgs {
    /// Stop after this many polls (default: run until Ctrl-C).
    #[arg(long, value_name = "N")]
    pub ticks: Option<u64>,

    /// Noise mode: none, additive or multiplicative.
    #[arg(long, value_name = "MODE", value_parser = parse_noise_mode)]
    pub noise: Option<NoiseMode>,

    /// Voltage to request before starting.
    #[arg(long, value_name = "VOLTS")]
    pub voltage: Option<f64>,

    /// Current to request before starting.
    #[arg(long, value_name = "AMPS")]
    pub current: Option<f64>,

    /// Hold power constant at this target.
    #[arg(long, value_name = "WATTS")]
    pub power: Option<f64>,

    /// Axis held under constant power: cv or cc.
    #[arg(long, value_name = "MODE", value_parser = parse_regulation_mode)]
    pub hold: Option<RegulationMode>,

    /// Switch the output on for the run and off afterwards.
    #[arg(long, default_value_t = false)]
    pub output: bool,
}

fn parse_noise_mode(value: &str) -> Result<NoiseMode, String> {
    NoiseMode::from_name(value)
        .ok_or_else(|| format!("expected none, additive or multiplicative, got {value:?}"))
}

fn parse_regulation_mode(value: &str) -> Result<RegulationMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "cv" => Ok(RegulationMode::ConstantVoltage),
        "cc" => Ok(RegulationMode::ConstantCurrent),
        _ => Err(format!("expected cv or cc, got {value:?}")),
    }
}

impl Cli {
    /// Transport chosen on the command line, if any
    pub fn transport_override(&self) -> Option<TransportConfig> {
        if self.sim {
            return Some(TransportConfig::Simulated);
        }
        if let Some(endpoint) = &self.tcp {
            return Some(TransportConfig::tcp_from_endpoint(endpoint));
        }
        self.serial.as_ref().map(|port| {
            let mut serial = SerialConfig {
                port: port.clone(),
                ..Default::default()
            };
            if let Some(baud) = self.baud {
                serial.baud_rate = baud;
            }
            TransportConfig::Serial(serial)
        })
    }

    /// Apply command line overrides on top of a loaded configuration
    pub fn apply(&self, config: &mut BenchConfig) {
        if let Some(transport) = self.transport_override() {
            config.transport = transport;
        }
        if let Command::Run(RunArgs {
            noise: Some(mode), ..
        }) = &self.command
        {
            config.noise.mode = *mode;
        }
    }

    /// Default log filter for the verbosity level
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "psu_bench=info,psu_protocol=info,psu_transport=info,psu_regulation=info,psu_sim=info",
            1 => "psu_bench=debug,psu_protocol=debug,psu_transport=debug,psu_regulation=debug,psu_sim=debug",
            _ => "psu_bench=trace,psu_protocol=trace,psu_transport=trace,psu_regulation=trace,psu_sim=trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("psu-bench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_set_voltage() {
        let cli = parse(&["--serial", "COM3", "set-voltage", "12.5"]);
        assert_eq!(cli.command, Command::SetVoltage { volts: 12.5 });
        assert_eq!(
            cli.transport_override(),
            Some(TransportConfig::Serial(SerialConfig {
                port: "COM3".into(),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn test_serial_baud() {
        let cli = parse(&["--serial", "/dev/ttyACM0", "--baud", "9600", "identify"]);
        let Some(TransportConfig::Serial(serial)) = cli.transport_override() else {
            panic!("expected serial");
        };
        assert_eq!(serial.baud_rate, 9600);
    }

    #[test]
    fn test_tcp_and_sim_conflict() {
        assert!(Cli::try_parse_from(["psu-bench", "--tcp", "host", "--sim", "reset"]).is_err());
        assert!(Cli::try_parse_from(["psu-bench", "--serial", "COM1", "--sim", "reset"]).is_err());
    }

    #[test]
    fn test_run_args() {
        let cli = parse(&[
            "--sim", "run", "--ticks", "5", "--noise", "multiplicative", "--voltage", "12",
            "--hold", "cc", "--output",
        ]);
        let Command::Run(args) = &cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.ticks, Some(5));
        assert_eq!(args.noise, Some(NoiseMode::Multiplicative));
        assert_eq!(args.voltage, Some(12.0));
        assert_eq!(args.hold, Some(RegulationMode::ConstantCurrent));
        assert!(args.output);

        let mut config = BenchConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.transport, TransportConfig::Simulated);
        assert_eq!(config.noise.mode, NoiseMode::Multiplicative);
    }

    #[test]
    fn test_bad_noise_mode() {
        assert!(Cli::try_parse_from(["psu-bench", "run", "--noise", "pink"]).is_err());
    }

    #[test]
    fn test_no_override_keeps_config() {
        let cli = parse(&["identify"]);
        let mut config = BenchConfig {
            transport: TransportConfig::Stub,
            ..Default::default()
        };
        cli.apply(&mut config);
        assert_eq!(config.transport, TransportConfig::Stub);
    }

    #[test]
    fn test_verbosity_filter() {
        assert!(parse(&["reset"]).log_filter().starts_with("psu_bench=info"));
        assert!(parse(&["-vv", "reset"]).log_filter().starts_with("psu_bench=trace"));
    }
}
