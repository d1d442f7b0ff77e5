//! Core domain types for a reconnaissance scan.
//!
//! A scan moves one target through enumeration, probing and vulnerability
//! scanning. These types carry the results of each stage and the persisted
//! top-level scan record.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── Scan identity ─────────────────────────────────────────────────

/// Identifier of a persisted scan, assigned by the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanId(pub i64);

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Enums ─────────────────────────────────────────────────────────

/// Operating mode: governs pacing between tool launches and tool aggressiveness.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Stealth,
    #[default]
    Normal,
    Aggressive,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stealth => "stealth",
            Self::Normal => "normal",
            Self::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stealth" => Ok(Self::Stealth),
            "normal" => Ok(Self::Normal),
            "aggressive" => Ok(Self::Aggressive),
            _ => Err(CoreError::Config(format!(
                "Invalid mode: {s}. Choose: stealth, normal, aggressive"
            ))),
        }
    }
}

/// Lifecycle of a scan record.
///
/// A scan starts `Running` and ends in exactly one of `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Only `Running -> Completed` and `Running -> Failed` are allowed.
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        matches!(self, Self::Running) && next.is_terminal()
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(CoreError::Config(format!("Unknown scan status: {s}"))),
        }
    }
}

/// Finding severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Numeric rank used for ordering in storage (higher is more severe).
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Lenient mapping from a scanner's severity label.
    ///
    /// Scanners emit labels such as `unknown` that have no counterpart here;
    /// those map to `Info`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Stage records ─────────────────────────────────────────────────

/// A discovered subdomain and the set of tools that reported it.
///
/// Identity is the hostname; repeated discoveries merge their tool sets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubdomainRecord {
    pub hostname: String,
    pub sources: BTreeSet<String>,
}

impl SubdomainRecord {
    pub fn new(hostname: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            sources: BTreeSet::from([source.into()]),
        }
    }

    /// Union another discovery of the same hostname into this record.
    pub fn merge(&mut self, other: SubdomainRecord) {
        debug_assert_eq!(self.hostname, other.hostname);
        self.sources.extend(other.sources);
    }
}

/// A host that answered an HTTP probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveHostRecord {
    pub url: String,
    /// Hostname the probe was issued for; the key used to merge with subdomain rows.
    pub hostname: String,
    pub ip: Option<String>,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    pub content_length: Option<u64>,
    pub technologies: BTreeSet<String>,
}

/// Optional fields attached to a subdomain row.
///
/// Every field is optional: `None` (or an empty set) means "not yet known",
/// e.g. a subdomain that has been enumerated but not probed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostDetails {
    /// Enumeration tools that reported the hostname.
    #[serde(default)]
    pub sources: BTreeSet<String>,
    pub url: Option<String>,
    pub ip: Option<String>,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    #[serde(default)]
    pub technologies: BTreeSet<String>,
}

impl HostDetails {
    /// Overlay newer knowledge onto this row.
    ///
    /// Known fields in `newer` overwrite, unknown ones leave the current value.
    /// Sources accumulate.
    pub fn merge(&mut self, newer: &HostDetails) {
        self.sources.extend(newer.sources.iter().cloned());
        if newer.url.is_some() {
            self.url = newer.url.clone();
        }
        if newer.ip.is_some() {
            self.ip = newer.ip.clone();
        }
        if newer.status_code.is_some() {
            self.status_code = newer.status_code;
        }
        if newer.title.is_some() {
            self.title = newer.title.clone();
        }
        if !newer.technologies.is_empty() {
            self.technologies = newer.technologies.clone();
        }
    }
}

impl From<&SubdomainRecord> for HostDetails {
    fn from(record: &SubdomainRecord) -> Self {
        Self {
            sources: record.sources.clone(),
            ..Default::default()
        }
    }
}

impl From<&LiveHostRecord> for HostDetails {
    fn from(host: &LiveHostRecord) -> Self {
        Self {
            sources: BTreeSet::new(),
            url: Some(host.url.clone()),
            ip: host.ip.clone(),
            status_code: host.status_code,
            title: host.title.clone(),
            technologies: host.technologies.clone(),
        }
    }
}

/// A single finding reported by the vulnerability scanner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VulnerabilityRecord {
    pub host: String,
    pub template_id: String,
    pub name: Option<String>,
    pub severity: Severity,
    pub description: Option<String>,
    pub matched_at: Option<String>,
    /// The scanner's finding exactly as emitted.
    pub raw: serde_json::Value,
}

// ── Scan record ───────────────────────────────────────────────────

/// The top-level unit of one end-to-end run against one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: ScanId,
    pub target: String,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// The scan request, serialized as it was when the scan started.
    pub config: serde_json::Value,
    pub subdomains: Vec<SubdomainRecord>,
    pub live_hosts: Vec<LiveHostRecord>,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
}

impl ScanRecord {
    /// A freshly created scan in the `Running` state.
    pub fn running(id: ScanId, target: &str, config: serde_json::Value) -> Self {
        Self {
            id,
            target: target.to_string(),
            status: ScanStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            config,
            subdomains: Vec::new(),
            live_hosts: Vec::new(),
            vulnerabilities: Vec::new(),
        }
    }

    /// Move to a terminal status, stamping the completion time.
    pub fn finish(&mut self, status: ScanStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(status) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Info);
        assert_eq!(Severity::Critical.rank(), 4);
        assert_eq!(Severity::Info.rank(), 0);
    }

    #[test]
    fn severity_from_scanner_labels() {
        assert_eq!(Severity::from_label("HIGH"), Severity::High);
        assert_eq!(Severity::from_label(" critical "), Severity::Critical);
        assert_eq!(Severity::from_label("unknown"), Severity::Info);
        assert_eq!(Severity::from_label(""), Severity::Info);
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Stealth".parse::<ScanMode>().unwrap(), ScanMode::Stealth);
        assert_eq!("aggressive".parse::<ScanMode>().unwrap(), ScanMode::Aggressive);
        assert!("loud".parse::<ScanMode>().is_err());
    }

    #[test]
    fn status_transitions() {
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Completed));
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Failed));
        assert!(!ScanStatus::Running.can_transition_to(ScanStatus::Running));
        assert!(!ScanStatus::Completed.can_transition_to(ScanStatus::Running));
        assert!(!ScanStatus::Failed.can_transition_to(ScanStatus::Completed));
    }

    #[test]
    fn scan_record_finishes_once() {
        let mut record = ScanRecord::running(ScanId(1), "example.com", serde_json::Value::Null);
        assert!(record.completed_at.is_none());

        record.finish(ScanStatus::Completed).unwrap();
        assert_eq!(record.status, ScanStatus::Completed);
        assert!(record.completed_at.is_some());

        let err = record.finish(ScanStatus::Failed).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: ScanStatus::Completed,
                to: ScanStatus::Failed
            }
        ));
    }

    #[test]
    fn subdomain_merge_unions_sources() {
        let mut record = SubdomainRecord::new("api.example.com", "subfinder");
        record.merge(SubdomainRecord::new("api.example.com", "amass"));
        record.merge(SubdomainRecord::new("api.example.com", "subfinder"));
        let sources: Vec<_> = record.sources.iter().map(String::as_str).collect();
        assert_eq!(sources, vec!["amass", "subfinder"]);
    }

    #[test]
    fn host_details_from_live_host() {
        let host = LiveHostRecord {
            url: "https://www.example.com".to_string(),
            hostname: "www.example.com".to_string(),
            ip: Some("93.184.216.34".to_string()),
            status_code: Some(200),
            title: Some("Example".to_string()),
            content_length: Some(1256),
            technologies: BTreeSet::from(["nginx".to_string()]),
        };
        let details = HostDetails::from(&host);
        assert_eq!(details.url.as_deref(), Some("https://www.example.com"));
        assert_eq!(details.status_code, Some(200));
        assert!(details.sources.is_empty());
    }

    #[test]
    fn host_details_merge_keeps_known_fields() {
        let mut row = HostDetails::from(&SubdomainRecord::new("www.example.com", "subfinder"));
        row.title = Some("Old".to_string());

        let probe = HostDetails {
            status_code: Some(301),
            url: Some("http://www.example.com".to_string()),
            sources: BTreeSet::from(["amass".to_string()]),
            ..Default::default()
        };
        row.merge(&probe);

        assert_eq!(row.status_code, Some(301));
        assert_eq!(row.title.as_deref(), Some("Old"));
        assert_eq!(row.sources.len(), 2);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ScanStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
