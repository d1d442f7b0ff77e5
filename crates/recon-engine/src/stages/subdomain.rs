//! Subdomain enumeration.
//!
//! Fans out to subfinder, amass and assetfinder concurrently (bounded by the
//! scan's thread budget) and merges their output into one sorted set.
//! Individual tool failures are recorded and never fail the stage.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use recon_core::config::ProviderKeys;
use recon_core::target::{is_valid_hostname, validate_hostname};
use recon_core::{ScanMode, SubdomainRecord};
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::Semaphore;

use super::{normalize_hostname, path_arg, Stage, StageContext, ToolFailure};
use crate::config::ToolPaths;
use crate::error::{StageError, ToolExecutionError};
use crate::runner::{ExitClassification, ToolCommand};

/// The enumeration tools, in merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationTool {
    Subfinder,
    Amass,
    Assetfinder,
}

impl EnumerationTool {
    pub const ALL: [Self; 3] = [Self::Subfinder, Self::Amass, Self::Assetfinder];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Subfinder => "subfinder",
            Self::Amass => "amass",
            Self::Assetfinder => "assetfinder",
        }
    }

    fn program<'a>(&self, tools: &'a ToolPaths) -> &'a str {
        match self {
            Self::Subfinder => &tools.subfinder,
            Self::Amass => &tools.amass,
            Self::Assetfinder => &tools.assetfinder,
        }
    }
}

/// Merged enumeration result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubdomainOutcome {
    /// Every hostname exactly once, sorted.
    pub subdomains: Vec<SubdomainRecord>,
    /// Hostnames each successful tool reported.
    pub per_tool: BTreeMap<String, Vec<String>>,
    /// Tools that failed, in tool order.
    pub errors: Vec<ToolFailure>,
}

impl SubdomainOutcome {
    pub fn hostnames(&self) -> Vec<String> {
        self.subdomains.iter().map(|s| s.hostname.clone()).collect()
    }

    pub fn total_count(&self) -> usize {
        self.subdomains.len()
    }
}

pub struct SubdomainStage {
    ctx: StageContext,
}

impl SubdomainStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for SubdomainStage {
    type Input = str;
    type Output = SubdomainOutcome;

    fn name(&self) -> &'static str {
        "subdomain"
    }

    async fn run(&self, target: &str) -> Result<SubdomainOutcome, StageError> {
        let target = validate_hostname(target)
            .map_err(|_| StageError::InvalidTarget(target.to_string()))?
            .to_string();

        let permits = Arc::new(Semaphore::new(self.ctx.request.settings().threads.max(1)));
        let handles: Vec<_> = EnumerationTool::ALL
            .into_iter()
            .map(|tool| {
                let ctx = self.ctx.clone();
                let permits = Arc::clone(&permits);
                let target = target.clone();
                let handle = tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    enumerate(&ctx, tool, &target).await
                });
                (tool, handle)
            })
            .collect();

        let mut merged: BTreeMap<String, SubdomainRecord> = BTreeMap::new();
        let mut outcome = SubdomainOutcome::default();

        for (tool, handle) in handles {
            let failure = match handle.await {
                Ok(Ok(hosts)) => {
                    tracing::info!(tool = tool.name(), found = hosts.len(), "Enumeration tool finished");
                    for host in &hosts {
                        let found = SubdomainRecord::new(host.clone(), tool.name());
                        match merged.get_mut(host) {
                            Some(record) => record.merge(found),
                            None => {
                                merged.insert(host.clone(), found);
                            }
                        }
                    }
                    outcome.per_tool.insert(tool.name().to_string(), hosts);
                    continue;
                }
                Ok(Err(e)) => ToolFailure::from(&e),
                Err(e) => ToolFailure {
                    tool: tool.name().to_string(),
                    classification: ExitClassification::InternalError,
                    message: format!("{} task did not complete: {e}", tool.name()),
                },
            };
            tracing::warn!(tool = tool.name(), error = %failure.message, "Enumeration tool failed");
            outcome.errors.push(failure);
        }

        outcome.subdomains = merged.into_values().collect();
        tracing::info!(
            target = %target,
            subdomains = outcome.subdomains.len(),
            failed_tools = outcome.errors.len(),
            "Subdomain enumeration complete"
        );
        Ok(outcome)
    }
}

async fn enumerate(
    ctx: &StageContext,
    tool: EnumerationTool,
    target: &str,
) -> Result<Vec<String>, ToolExecutionError> {
    let settings = ctx.request.settings();
    let mut command = ToolCommand::new(tool.name(), tool.program(&ctx.tools));

    // Held until the call returns; the file is removed on drop.
    let mut _provider_file = None;

    match tool {
        EnumerationTool::Subfinder => {
            command = command.args(["-d", target, "-silent"]);
            if let Some(file) = provider_config(&settings.subfinder.api_keys).map_err(|e| {
                ToolExecutionError::Internal {
                    tool: tool.name().to_string(),
                    message: format!("cannot write provider config: {e}"),
                }
            })? {
                command = command.arg("-provider-config").arg(path_arg(&file));
                _provider_file = Some(file);
            }
        }
        EnumerationTool::Amass => {
            command = command.args(["enum", "-d", target, "-silent"]);
            if settings.mode == ScanMode::Stealth || settings.amass.passive {
                command = command.arg("-passive");
            }
        }
        EnumerationTool::Assetfinder => {
            command = command.args(["--subs-only", target]);
        }
    }

    let result = ctx.executor.execute(&command, ctx.tool_timeout).await?;

    let hosts: BTreeSet<String> = result
        .stdout_lines()
        .filter_map(|line| {
            let host = normalize_hostname(line)?;
            if is_valid_hostname(&host) {
                Some(host)
            } else {
                tracing::debug!(tool = tool.name(), line = %line, "Ignoring non-hostname output");
                None
            }
        })
        .collect();
    Ok(hosts.into_iter().collect())
}

/// Subfinder provider-config YAML holding the configured API keys.
fn provider_config(keys: &ProviderKeys) -> std::io::Result<Option<NamedTempFile>> {
    if keys.is_empty() {
        return Ok(None);
    }

    let providers: BTreeMap<&str, Vec<&str>> = [
        ("virustotal", &keys.virustotal),
        ("shodan", &keys.shodan),
        ("censys", &keys.censys),
        ("chaos", &keys.chaos),
    ]
    .into_iter()
    .filter_map(|(name, key)| match key.as_deref() {
        Some(k) if !k.is_empty() => Some((name, vec![k])),
        _ => None,
    })
    .collect();

    let mut file = tempfile::Builder::new()
        .prefix("recon-providers-")
        .suffix(".yaml")
        .tempfile()?;
    serde_yaml::to_writer(&mut file, &providers).map_err(std::io::Error::other)?;
    file.flush()?;
    Ok(Some(file))
}
