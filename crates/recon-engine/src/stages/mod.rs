//! Pipeline stages.
//!
//! Each stage wraps one or more external tools behind [`Stage::run`] and
//! hands back a value result. Stages never write to storage; the
//! orchestrator persists what they return.

pub mod http;
pub mod subdomain;
pub mod vulnerability;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recon_core::ScanRequest;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::{EngineConfig, ToolPaths};
use crate::error::{StageError, ToolExecutionError};
use crate::runner::{ExitClassification, ToolExecutor};
use crate::stealth::StealthPolicy;

pub use http::{AnalyzedHost, HttpProbeOutcome, HttpProbeStage};
pub use subdomain::{EnumerationTool, SubdomainOutcome, SubdomainStage};
pub use vulnerability::{VulnerabilityOutcome, VulnerabilityStage};

/// One phase of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: ?Sized + Sync;
    type Output: Send;

    fn name(&self) -> &'static str;

    async fn run(&self, input: &Self::Input) -> Result<Self::Output, StageError>;
}

/// Everything a stage needs to launch its tools. Cheap to clone.
#[derive(Clone)]
pub struct StageContext {
    pub executor: Arc<dyn ToolExecutor>,
    pub stealth: Arc<StealthPolicy>,
    pub request: Arc<ScanRequest>,
    pub tools: ToolPaths,
    /// Hard bound on a single tool call.
    pub tool_timeout: Duration,
}

impl StageContext {
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        stealth: Arc<StealthPolicy>,
        request: Arc<ScanRequest>,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            executor,
            stealth,
            request,
            tools: engine.tools.clone(),
            tool_timeout: engine.tool_timeout(),
        }
    }
}

/// A tool that failed inside a tool-tolerant stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolFailure {
    pub tool: String,
    pub classification: ExitClassification,
    pub message: String,
}

impl From<&ToolExecutionError> for ToolFailure {
    fn from(err: &ToolExecutionError) -> Self {
        Self {
            tool: err.tool().to_string(),
            classification: err.classification(),
            message: err.to_string(),
        }
    }
}

/// Write one entry per line to a temp file deleted when the handle drops.
pub(crate) fn write_targets_file(entries: &[String]) -> Result<NamedTempFile, StageError> {
    let mut file = tempfile::Builder::new()
        .prefix("recon-targets-")
        .suffix(".txt")
        .tempfile()?;
    for entry in entries {
        writeln!(file, "{entry}")?;
    }
    file.flush()?;
    Ok(file)
}

pub(crate) fn path_arg(file: &NamedTempFile) -> String {
    file.path().to_string_lossy().into_owned()
}

/// Canonical hostname form: trimmed, lowercase, no trailing root dot.
pub fn normalize_hostname(raw: &str) -> Option<String> {
    let host = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hostname() {
        assert_eq!(
            normalize_hostname("  WWW.Example.COM.\n"),
            Some("www.example.com".to_string())
        );
        assert_eq!(normalize_hostname("   "), None);
        assert_eq!(normalize_hostname("."), None);
    }

    #[test]
    fn test_targets_file_removed_on_drop() {
        let file = write_targets_file(&["a.example.com".to_string(), "b.example.com".to_string()])
            .unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "a.example.com\nb.example.com\n"
        );
        drop(file);
        assert!(!path.exists());
    }
}
