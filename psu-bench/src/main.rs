//! Bench Power Supply Driver
//!
//! Headless front end for the regulation engine. Talks to a supply over a
//! serial port, a raw SCPI socket or the built-in virtual supply.

mod cli;
mod config;
mod error;
mod session;

use clap::Parser;
use cli::Cli;
use error::BenchError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BenchError> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting psu-bench {}", env!("CARGO_PKG_VERSION"));

    let result = session::run(cli).await;
    if let Err(e) = &result {
        tracing::error!("{}", e);
    }
    result
}
