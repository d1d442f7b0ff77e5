//! Configuration for the scan engine.

use std::path::PathBuf;
use std::time::Duration;

use recon_core::CoreError;
use serde::Deserialize;

use crate::report::ReportFormat;

/// Engine-level configuration.
///
/// Loaded from the `[engine]` section of `recon.toml` or
/// `RECON__ENGINE__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Executable paths for the external tools.
    #[serde(default)]
    pub tools: ToolPaths,

    /// SQLite database path (default: `<output_dir>/recon.db`).
    pub database_path: Option<String>,

    /// Directory for results and reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Format of the report generated at the end of a scan.
    #[serde(default)]
    pub report_format: ReportFormat,

    /// Hard timeout for a single tool invocation, in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

/// Executable for each external tool. Bare names resolve through `PATH`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ToolPaths {
    #[serde(default = "default_subfinder")]
    pub subfinder: String,
    #[serde(default = "default_amass")]
    pub amass: String,
    #[serde(default = "default_assetfinder")]
    pub assetfinder: String,
    #[serde(default = "default_httpx")]
    pub httpx: String,
    #[serde(default = "default_nuclei")]
    pub nuclei: String,
}

impl ToolPaths {
    /// (tool name, executable) for every configured tool.
    pub fn all(&self) -> [(&'static str, &str); 5] {
        [
            ("subfinder", self.subfinder.as_str()),
            ("amass", self.amass.as_str()),
            ("assetfinder", self.assetfinder.as_str()),
            ("httpx", self.httpx.as_str()),
            ("nuclei", self.nuclei.as_str()),
        ]
    }
}

fn default_subfinder() -> String {
    "subfinder".to_string()
}

fn default_amass() -> String {
    "amass".to_string()
}

fn default_assetfinder() -> String {
    "assetfinder".to_string()
}

fn default_httpx() -> String {
    "httpx".to_string()
}

fn default_nuclei() -> String {
    "nuclei".to_string()
}

fn default_output_dir() -> String {
    "./results".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    300
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            subfinder: default_subfinder(),
            amass: default_amass(),
            assetfinder: default_assetfinder(),
            httpx: default_httpx(),
            nuclei: default_nuclei(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            database_path: None,
            output_dir: default_output_dir(),
            report_format: ReportFormat::default(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// Read the `[engine]` section, falling back to defaults when absent.
    pub fn from_layered(cfg: &config::Config) -> Result<Self, CoreError> {
        match cfg.get::<EngineConfig>("engine") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(CoreError::Config(e.to_string())),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from(&self.output_dir).join("recon.db"),
        }
    }
}
