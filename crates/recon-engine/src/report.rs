//! Report projection.
//!
//! Reads the most recent scan for a target back from the store and renders
//! it as a standalone HTML page or pretty JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use recon_core::Severity;
use recon_store::{ScanStore, StoreError, StoredScan, StoredSubdomain, StoredVulnerability};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No scan found for {0}")]
    NotFound(String),

    #[error("Unsupported report format: {0}. Choose: html, json")]
    UnsupportedFormat(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Html,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            _ => Err(ReportError::UnsupportedFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub total_subdomains: usize,
    /// Subdomain rows the probe stage confirmed with a status code.
    pub live_hosts: usize,
    pub total_vulnerabilities: usize,
    pub by_severity: BTreeMap<Severity, usize>,
}

/// Everything a report shows, in display order.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub scan: StoredScan,
    pub target: String,
    /// Alphabetical by hostname.
    pub subdomains: Vec<StoredSubdomain>,
    /// Most severe first.
    pub vulnerabilities: Vec<StoredVulnerability>,
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
}

pub struct ReportGenerator<'a> {
    store: &'a dyn ScanStore,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(store: &'a dyn ScanStore) -> Self {
        Self { store }
    }

    /// Collect the latest scan for `target` with its rows.
    pub fn gather(&self, target: &str) -> Result<ReportData, ReportError> {
        let scan = self
            .store
            .latest_scan(target)?
            .ok_or_else(|| ReportError::NotFound(target.to_string()))?;
        let subdomains = self.store.subdomains(scan.id)?;
        let vulnerabilities = self.store.vulnerabilities(scan.id)?;

        let mut by_severity = BTreeMap::new();
        for v in &vulnerabilities {
            *by_severity.entry(v.finding.severity).or_insert(0) += 1;
        }
        let summary = ReportSummary {
            total_subdomains: subdomains.len(),
            live_hosts: subdomains.iter().filter(|s| s.is_live()).count(),
            total_vulnerabilities: vulnerabilities.len(),
            by_severity,
        };

        Ok(ReportData {
            scan,
            target: target.to_string(),
            subdomains,
            vulnerabilities,
            generated_at: Utc::now(),
            summary,
        })
    }

    /// Render the report into `output_dir` and return the written path.
    pub fn generate(
        &self,
        target: &str,
        output_dir: &Path,
        format: ReportFormat,
    ) -> Result<PathBuf, ReportError> {
        let data = self.gather(target)?;
        std::fs::create_dir_all(output_dir)?;

        let body = match format {
            ReportFormat::Html => render_html(&data),
            ReportFormat::Json => serde_json::to_string_pretty(&data)?,
        };
        let path = output_dir.join(format!("recon_report_{}.{}", data.target, format.extension()));
        std::fs::write(&path, body)?;

        tracing::info!(
            target = %target,
            scan_id = %data.scan.id,
            format = %format,
            path = %path.display(),
            "Report generated"
        );
        Ok(path)
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn render_html(data: &ReportData) -> String {
    let target = html_escape(&data.target);
    let mut html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Recon Report: {target}</title>
    <style>
        body {{ font-family: sans-serif; margin: 2rem; color: #222; }}
        table {{ border-collapse: collapse; width: 100%; margin-bottom: 2rem; }}
        th, td {{ border: 1px solid #ccc; padding: 0.4rem; text-align: left; }}
        th {{ background: #f0f0f0; }}
        .critical {{ color: #b00020; font-weight: bold; }}
        .high {{ color: #d84315; }}
        .medium {{ color: #f9a825; }}
        .low {{ color: #2e7d32; }}
        .info {{ color: #1565c0; }}
    </style>
</head>
<body>
    <h1>Recon Report: {target}</h1>
    <p>Scan #{id} ({status}), started {started}, generated {generated}</p>
    <h2>Summary</h2>
    <ul>
        <li>Subdomains: {total_subdomains}</li>
        <li>Live hosts: {live_hosts}</li>
        <li>Vulnerabilities: {total_vulnerabilities}</li>
    </ul>
"#,
        id = data.scan.id,
        status = data.scan.status,
        started = data.scan.started_at.to_rfc3339(),
        generated = data.generated_at.to_rfc3339(),
        total_subdomains = data.summary.total_subdomains,
        live_hosts = data.summary.live_hosts,
        total_vulnerabilities = data.summary.total_vulnerabilities,
    );

    html.push_str(
        "    <h2>Subdomains</h2>\n    <table>\n        <tr><th>Hostname</th><th>Status</th><th>Title</th><th>Technologies</th><th>Sources</th></tr>\n",
    );
    for sub in &data.subdomains {
        let details = &sub.details;
        html.push_str(&format!(
            "        <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            html_escape(&sub.hostname),
            details.status_code.map(|c| c.to_string()).unwrap_or_default(),
            html_escape(details.title.as_deref().unwrap_or("")),
            html_escape(&join(&details.technologies)),
            html_escape(&join(&details.sources)),
        ));
    }
    html.push_str("    </table>\n");

    html.push_str(
        "    <h2>Vulnerabilities</h2>\n    <table>\n        <tr><th>Severity</th><th>Template</th><th>Name</th><th>Host</th><th>Matched at</th></tr>\n",
    );
    for vuln in &data.vulnerabilities {
        let finding = &vuln.finding;
        html.push_str(&format!(
            "        <tr><td class=\"{sev}\">{sev}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            html_escape(&finding.template_id),
            html_escape(finding.name.as_deref().unwrap_or("")),
            html_escape(&finding.host),
            html_escape(finding.matched_at.as_deref().unwrap_or("")),
            sev = finding.severity,
        ));
    }
    html.push_str("    </table>\n</body>\n</html>\n");
    html
}

fn join<'s>(items: impl IntoIterator<Item = &'s String>) -> String {
    items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
