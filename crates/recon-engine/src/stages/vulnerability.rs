//! Template-based vulnerability scanning with nuclei.
//!
//! Every parsed finding becomes one record; nothing is deduplicated.
//! A scanner failure fails the stage since there is no fallback tool.

use async_trait::async_trait;
use recon_core::{ScanMode, Severity, VulnerabilityRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{path_arg, write_targets_file, Stage, StageContext};
use crate::error::StageError;
use crate::runner::{parse_json_lines, ToolCommand};

const TOOL: &str = "nuclei";

const STEALTH_RATE_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
struct NucleiFinding {
    #[serde(rename = "template-id", alias = "templateID")]
    template_id: String,
    #[serde(default)]
    info: FindingInfo,
    host: Option<String>,
    #[serde(rename = "matched-at", alias = "matched")]
    matched_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FindingInfo {
    name: Option<String>,
    severity: Option<String>,
    description: Option<String>,
}

fn to_record(raw: Value) -> Option<VulnerabilityRecord> {
    let finding = match NucleiFinding::deserialize(&raw) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(tool = TOOL, error = %e, "Skipping finding without a template id");
            return None;
        }
    };
    let host = finding
        .host
        .clone()
        .or_else(|| finding.matched_at.clone())
        .unwrap_or_default();

    Some(VulnerabilityRecord {
        host,
        template_id: finding.template_id,
        name: finding.info.name,
        severity: finding
            .info
            .severity
            .as_deref()
            .map(Severity::from_label)
            .unwrap_or_default(),
        description: finding.info.description,
        matched_at: finding.matched_at,
        raw,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VulnerabilityOutcome {
    pub vulnerabilities: Vec<VulnerabilityRecord>,
}

pub struct VulnerabilityStage {
    ctx: StageContext,
}

impl VulnerabilityStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    fn command(&self, targets_path: String) -> ToolCommand {
        let settings = self.ctx.request.settings();
        let nuclei = &settings.nuclei;
        let mut command = ToolCommand::new(TOOL, &self.ctx.tools.nuclei)
            .arg("-l")
            .arg(targets_path)
            .args(["-jsonl", "-silent"]);

        for template in &nuclei.templates {
            command = command.arg("-t").arg(template);
        }
        if !nuclei.severities.is_empty() {
            let severities: Vec<&str> = nuclei.severities.iter().map(Severity::as_str).collect();
            command = command.arg("-severity").arg(severities.join(","));
        }

        let rate_limit = nuclei.rate_limit.or(match settings.mode {
            ScanMode::Stealth => Some(STEALTH_RATE_LIMIT),
            _ => None,
        });
        if let Some(rate) = rate_limit {
            command = command.arg("-rate-limit").arg(rate.to_string());
        }

        for line in self.ctx.stealth.headers().header_lines() {
            command = command.arg("-H").arg(line);
        }
        if let Some(proxy) = self.ctx.stealth.proxy() {
            command = command.arg("-proxy").arg(proxy);
        }
        command.args(nuclei.extra_args.iter().cloned())
    }
}

#[async_trait]
impl Stage for VulnerabilityStage {
    type Input = [String];
    type Output = VulnerabilityOutcome;

    fn name(&self) -> &'static str {
        "vulnerability"
    }

    async fn run(&self, urls: &[String]) -> Result<VulnerabilityOutcome, StageError> {
        if urls.is_empty() {
            tracing::info!("No live hosts to scan");
            return Ok(VulnerabilityOutcome::default());
        }

        let targets = write_targets_file(urls)?;
        let command = self.command(path_arg(&targets));
        let result = self
            .ctx
            .executor
            .execute(&command, self.ctx.tool_timeout)
            .await;
        drop(targets);

        let result = result.map_err(|source| StageError::ToolFailed {
            stage: self.name(),
            source,
        })?;

        let vulnerabilities: Vec<VulnerabilityRecord> =
            parse_json_lines::<Value>(TOOL, &result.stdout)
                .into_iter()
                .filter_map(to_record)
                .collect();

        tracing::info!(
            scanned = urls.len(),
            findings = vulnerabilities.len(),
            "Vulnerability scan complete"
        );
        Ok(VulnerabilityOutcome { vulnerabilities })
    }
}
