//! Scan configuration.
//!
//! Configuration is loaded from (in priority order):
//! 1. Command-line overrides (applied by the caller)
//! 2. Environment variables (`RECON__` prefix, `__` separator)
//! 3. Config file (`recon.toml`)
//! 4. Defaults
//!
//! Named profiles live under `[profiles.<name>]` and replace the `[scan]`
//! section when selected.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::target::validate_hostname;
use crate::types::{ScanMode, Severity};

/// Tunable settings for one scan, independent of its target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Stealth/timing mode.
    #[serde(default)]
    pub mode: ScanMode,

    /// Per-request timeout handed to probing tools, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Concurrency budget for tool fan-out within a stage.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// User-agent pool; empty means the built-in browser pool.
    #[serde(default)]
    pub user_agents: Vec<String>,

    /// Proxy endpoints, picked at random per HTTP tool invocation.
    #[serde(default)]
    pub proxies: Vec<String>,

    #[serde(default)]
    pub subfinder: SubfinderOptions,

    #[serde(default)]
    pub amass: AmassOptions,

    #[serde(default)]
    pub httpx: HttpxOptions,

    #[serde(default)]
    pub nuclei: NucleiOptions,
}

/// Options for the subfinder enumeration tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubfinderOptions {
    /// Passive-source API keys, written to a provider-config file per run.
    #[serde(default)]
    pub api_keys: ProviderKeys,
}

/// API keys for subfinder's passive providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderKeys {
    pub virustotal: Option<String>,
    pub shodan: Option<String>,
    pub censys: Option<String>,
    pub chaos: Option<String>,
}

impl ProviderKeys {
    pub fn is_empty(&self) -> bool {
        [&self.virustotal, &self.shodan, &self.censys, &self.chaos]
            .iter()
            .all(|k| k.as_deref().map_or(true, str::is_empty))
    }
}

/// Options for the amass enumeration tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmassOptions {
    /// Force passive enumeration outside stealth mode too.
    #[serde(default)]
    pub passive: bool,
}

/// Options for the httpx probing tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpxOptions {
    /// Requests per second; stealth mode defaults this to 10.
    pub rate_limit: Option<u32>,

    /// Extra arguments appended verbatim.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Options for the nuclei vulnerability scanner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NucleiOptions {
    /// Template paths or identifiers; empty runs the scanner's default set.
    #[serde(default)]
    pub templates: Vec<String>,

    /// Only report findings at these severities; empty reports all.
    #[serde(default)]
    pub severities: Vec<Severity>,

    /// Requests per second; stealth mode defaults this to 10.
    pub rate_limit: Option<u32>,

    /// Extra arguments appended verbatim.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_threads() -> usize {
    10
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            mode: ScanMode::default(),
            timeout_secs: default_timeout_secs(),
            threads: default_threads(),
            user_agents: Vec::new(),
            proxies: Vec::new(),
            subfinder: SubfinderOptions::default(),
            amass: AmassOptions::default(),
            httpx: HttpxOptions::default(),
            nuclei: NucleiOptions::default(),
        }
    }
}

impl ScanSettings {
    /// Read settings from a layered configuration.
    ///
    /// With a profile, `[profiles.<name>]` must exist. Without one, the
    /// `[scan]` section is used, falling back to defaults when absent.
    pub fn from_layered(cfg: &config::Config, profile: Option<&str>) -> Result<Self, CoreError> {
        match profile {
            Some(name) => {
                let settings = cfg
                    .get::<ScanSettings>(&format!("profiles.{name}"))
                    .map_err(|e| match e {
                        config::ConfigError::NotFound(_) => {
                            CoreError::Config(format!("Profile '{name}' not found"))
                        }
                        other => CoreError::Config(other.to_string()),
                    })?;
                tracing::debug!(profile = %name, mode = %settings.mode, "Scan profile loaded");
                Ok(settings)
            }
            None => match cfg.get::<ScanSettings>("scan") {
                Ok(settings) => Ok(settings),
                Err(config::ConfigError::NotFound(_)) => {
                    tracing::debug!("No [scan] section, using default settings");
                    Ok(Self::default())
                }
                Err(e) => Err(CoreError::Config(e.to_string())),
            },
        }
    }
}

/// Build the layered configuration: optional `<file_prefix>.toml` under
/// `RECON__`-prefixed environment variables.
pub fn load_layered(file_prefix: &str) -> Result<config::Config, CoreError> {
    config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("RECON")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| CoreError::Config(e.to_string()))
}

/// A validated request to scan one target. Immutable once a scan starts.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRequest {
    target: String,
    #[serde(flatten)]
    settings: ScanSettings,
}

impl ScanRequest {
    /// Validate the target and pair it with settings.
    pub fn new(target: &str, settings: ScanSettings) -> Result<Self, CoreError> {
        let target = validate_hostname(target)?.to_string();
        if settings.threads == 0 {
            return Err(CoreError::Config("threads must be at least 1".to_string()));
        }
        Ok(Self { target, settings })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn mode(&self) -> ScanMode {
        self.settings.mode
    }

    /// The request as stored alongside the scan row.
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(self)?)
    }
}
