//! HTTP probing with httpx.
//!
//! Hosts absent from the probe output are simply not live; there is no
//! dead-host record.

use std::collections::BTreeSet;
use std::net::IpAddr;

use async_trait::async_trait;
use recon_core::{LiveHostRecord, ScanMode};
use serde::{Deserialize, Serialize};

use super::{normalize_hostname, path_arg, write_targets_file, Stage, StageContext};
use crate::error::StageError;
use crate::runner::{parse_json_lines, ToolCommand};

const TOOL: &str = "httpx";

/// Requests per second in stealth mode unless configured otherwise.
const STEALTH_RATE_LIMIT: u32 = 10;

/// One httpx JSON line. Field names vary between httpx releases.
#[derive(Debug, Deserialize)]
struct ProbeLine {
    url: Option<String>,
    input: Option<String>,
    host: Option<String>,
    #[serde(default)]
    a: Vec<String>,
    #[serde(alias = "status-code")]
    status_code: Option<u16>,
    title: Option<String>,
    #[serde(alias = "content-length")]
    content_length: Option<u64>,
    #[serde(default, alias = "tech")]
    technologies: Vec<String>,
}

impl ProbeLine {
    fn into_record(self) -> Option<LiveHostRecord> {
        let url = self.url?;
        let hostname = self
            .input
            .as_deref()
            .and_then(normalize_hostname)
            .or_else(|| host_of_url(&url))?;
        let ip = self
            .a
            .into_iter()
            .next()
            .or_else(|| self.host.filter(|h| h.parse::<IpAddr>().is_ok()));

        Some(LiveHostRecord {
            url,
            hostname,
            ip,
            status_code: self.status_code,
            title: self.title.filter(|t| !t.is_empty()),
            content_length: self.content_length,
            technologies: self.technologies.into_iter().collect::<BTreeSet<_>>(),
        })
    }
}

/// Host component of a URL, lowercased.
fn host_of_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = match authority.strip_prefix('[') {
        Some(v6) => v6.split(']').next()?,
        None => authority.split(':').next()?,
    };
    normalize_hostname(host)
}

/// A live host plus the annotations derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedHost {
    #[serde(flatten)]
    host: LiveHostRecord,
    interesting: Vec<String>,
}

impl AnalyzedHost {
    pub fn host(&self) -> &LiveHostRecord {
        &self.host
    }

    pub fn interesting(&self) -> &[String] {
        &self.interesting
    }
}

/// Derive annotations. Rules apply independently.
pub fn analyze(host: &LiveHostRecord) -> AnalyzedHost {
    let mut interesting = Vec::new();
    if host.status_code == Some(200) {
        interesting.push("HTTP 200 OK".to_string());
    }
    if let Some(title) = &host.title {
        let title = title.to_lowercase();
        if ["admin", "login", "dashboard"]
            .iter()
            .any(|k| title.contains(k))
        {
            interesting.push("Admin/Login page detected".to_string());
        }
    }
    if !host.technologies.is_empty() {
        let techs: Vec<&str> = host.technologies.iter().map(String::as_str).collect();
        interesting.push(format!("Technologies: {}", techs.join(", ")));
    }
    AnalyzedHost {
        host: host.clone(),
        interesting,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HttpProbeOutcome {
    pub live_hosts: Vec<LiveHostRecord>,
    pub analyzed: Vec<AnalyzedHost>,
    pub total_live: usize,
}

impl HttpProbeOutcome {
    pub fn urls(&self) -> Vec<String> {
        self.live_hosts.iter().map(|h| h.url.clone()).collect()
    }
}

pub struct HttpProbeStage {
    ctx: StageContext,
}

impl HttpProbeStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    fn command(&self, targets_path: String) -> ToolCommand {
        let settings = self.ctx.request.settings();
        let mut command = ToolCommand::new(TOOL, &self.ctx.tools.httpx)
            .arg("-l")
            .arg(targets_path)
            .args([
                "-json",
                "-silent",
                "-follow-redirects",
                "-status-code",
                "-title",
                "-tech-detect",
                "-content-length",
                "-timeout",
            ])
            .arg(settings.timeout_secs.to_string());

        let rate_limit = settings.httpx.rate_limit.or(match settings.mode {
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
            command = command.arg("-http-proxy").arg(proxy);
        }
        command.args(settings.httpx.extra_args.iter().cloned())
    }
}

#[async_trait]
impl Stage for HttpProbeStage {
    type Input = [String];
    type Output = HttpProbeOutcome;

    fn name(&self) -> &'static str {
        "http"
    }

    async fn run(&self, hostnames: &[String]) -> Result<HttpProbeOutcome, StageError> {
        if hostnames.is_empty() {
            tracing::info!("No hostnames to probe");
            return Ok(HttpProbeOutcome::default());
        }

        let targets = write_targets_file(hostnames)?;
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

        let live_hosts: Vec<LiveHostRecord> = parse_json_lines::<ProbeLine>(TOOL, &result.stdout)
            .into_iter()
            .filter_map(|line| {
                let record = line.into_record();
                if record.is_none() {
                    tracing::warn!(tool = TOOL, "Skipping probe line without a usable URL");
                }
                record
            })
            .collect();
        let analyzed: Vec<AnalyzedHost> = live_hosts.iter().map(analyze).collect();

        tracing::info!(
            probed = hostnames.len(),
            live = live_hosts.len(),
            "HTTP probing complete"
        );

        Ok(HttpProbeOutcome {
            total_live: live_hosts.len(),
            live_hosts,
            analyzed,
        })
    }
}
