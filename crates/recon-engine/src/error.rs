//! Error types for the recon-engine crate.

use std::time::Duration;

use recon_core::ScanId;
use recon_store::StoreError;
use thiserror::Error;

use crate::report::ReportError;
use crate::runner::ExitClassification;

/// A tool call that could not produce a result.
#[derive(Error, Debug)]
pub enum ToolExecutionError {
    #[error("{tool} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} not found at path: {program}")]
    NotFound { tool: String, program: String },

    #[error("{tool} failed to execute: {message}")]
    Internal { tool: String, message: String },
}

impl ToolExecutionError {
    pub fn classification(&self) -> ExitClassification {
        match self {
            Self::Timeout { .. } => ExitClassification::Timeout,
            Self::NotFound { .. } => ExitClassification::NotFound,
            Self::Internal { .. } => ExitClassification::InternalError,
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            Self::Timeout { tool, .. } | Self::NotFound { tool, .. } | Self::Internal { tool, .. } => {
                tool
            }
        }
    }
}

/// A stage that could not produce its result.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("{stage} stage failed: {source}")]
    ToolFailed {
        stage: &'static str,
        #[source]
        source: ToolExecutionError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A scan that terminated in the `failed` state.
#[derive(Error, Debug)]
pub enum ScanExecutionError {
    #[error("Scan could not be started: {0}")]
    Setup(String),

    #[error("Scan {scan_id} failed during {stage}: {source}")]
    Stage {
        scan_id: ScanId,
        stage: &'static str,
        #[source]
        source: StageError,
    },

    #[error("Scan {scan_id} failed to persist results: {source}")]
    Store {
        scan_id: ScanId,
        #[source]
        source: StoreError,
    },

    #[error("Scan {scan_id} failed to generate its report: {source}")]
    Report {
        scan_id: ScanId,
        #[source]
        source: ReportError,
    },
}

impl ScanExecutionError {
    /// The scan row this error was recorded against, if one was created.
    pub fn scan_id(&self) -> Option<ScanId> {
        match self {
            Self::Setup(_) => None,
            Self::Stage { scan_id, .. } | Self::Store { scan_id, .. } | Self::Report { scan_id, .. } => {
                Some(*scan_id)
            }
        }
    }
}
