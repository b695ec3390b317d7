//! Error type for the bench driver

use psu_regulation::RegulationError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Regulation(#[from] RegulationError),

    #[error("self test failed with code {code}{}", detail_suffix(.detail))]
    SelfTestFailed { code: i32, detail: Option<String> },

    #[error("failed to listen for Ctrl-C: {0}")]
    Signal(std::io::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}
