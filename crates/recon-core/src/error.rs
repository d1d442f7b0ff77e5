use thiserror::Error;

use crate::types::ScanStatus;

/// Top-level error type for shared recon types and configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid scan status transition: {from} -> {to}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
