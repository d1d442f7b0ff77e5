//! Read operations for the scan store.
//!
//! These back report projection: the latest scan per target, its subdomain
//! rows alphabetically, and its findings by descending severity.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use recon_core::{HostDetails, ScanId, ScanStatus, Severity, VulnerabilityRecord};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::client::{SqliteStore, StoreError};

/// A persisted scan row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredScan {
    pub id: ScanId,
    pub target: String,
    pub scan_type: String,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub config: serde_json::Value,
}

/// A persisted subdomain row with whatever probe details are known.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSubdomain {
    pub hostname: String,
    #[serde(flatten)]
    pub details: HostDetails,
    pub discovered_at: DateTime<Utc>,
}

impl StoredSubdomain {
    /// Whether the row was confirmed live by the probe stage.
    pub fn is_live(&self) -> bool {
        self.details.status_code.is_some()
    }
}

/// A persisted finding row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredVulnerability {
    #[serde(flatten)]
    pub finding: VulnerabilityRecord,
    pub discovered_at: DateTime<Utc>,
}

/// Raw subdomain columns before JSON decoding.
pub(crate) struct SubdomainRow {
    hostname: String,
    sources: String,
    url: Option<String>,
    ip: Option<String>,
    status_code: Option<u16>,
    title: Option<String>,
    technologies: String,
    discovered_at: String,
}

impl SubdomainRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            hostname: row.get(0)?,
            sources: row.get(1)?,
            url: row.get(2)?,
            ip: row.get(3)?,
            status_code: row.get(4)?,
            title: row.get(5)?,
            technologies: row.get(6)?,
            discovered_at: row.get(7)?,
        })
    }
}

pub(crate) fn decode_details(row: &SubdomainRow) -> Result<HostDetails, StoreError> {
    Ok(HostDetails {
        sources: serde_json::from_str::<BTreeSet<String>>(&row.sources)?,
        url: row.url.clone(),
        ip: row.ip.clone(),
        status_code: row.status_code,
        title: row.title.clone(),
        technologies: serde_json::from_str::<BTreeSet<String>>(&row.technologies)?,
    })
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("bad timestamp {raw:?}: {e}")))
}

impl SqliteStore {
    /// Most recently started scan for `target`.
    pub fn find_latest_scan(&self, target: &str) -> Result<Option<StoredScan>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, target, scan_type, status, started_at, completed_at, config
                 FROM scans WHERE target = ?1
                 ORDER BY started_at DESC, id DESC LIMIT 1",
                params![target],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, target, scan_type, status, started_at, completed_at, config)) = row else {
            return Ok(None);
        };

        Ok(Some(StoredScan {
            id: ScanId(id),
            target,
            scan_type,
            status: status
                .parse::<ScanStatus>()
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            started_at: parse_time(&started_at)?,
            completed_at: completed_at.as_deref().map(parse_time).transpose()?,
            config: match config {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::Value::Null,
            },
        }))
    }

    /// Subdomain rows for a scan, ordered by hostname.
    pub fn list_subdomains(&self, scan_id: ScanId) -> Result<Vec<StoredSubdomain>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT subdomain, sources, url, ip_address, status_code, title, technologies,
                    discovered_at
             FROM subdomains WHERE scan_id = ?1
             ORDER BY subdomain ASC",
        )?;
        let rows = stmt
            .query_map(params![scan_id.0], SubdomainRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.iter()
            .map(|row| {
                Ok(StoredSubdomain {
                    hostname: row.hostname.clone(),
                    details: decode_details(row)?,
                    discovered_at: parse_time(&row.discovered_at)?,
                })
            })
            .collect()
    }

    /// Findings for a scan, most severe first, then in insertion order.
    pub fn list_vulnerabilities(
        &self,
        scan_id: ScanId,
    ) -> Result<Vec<StoredVulnerability>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT target, template_id, name, severity, description, matched_at, raw_output,
                    discovered_at
             FROM vulnerabilities WHERE scan_id = ?1
             ORDER BY severity_rank DESC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![scan_id.0], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(host, template_id, name, severity, description, matched_at, raw, found)| {
                    Ok(StoredVulnerability {
                        finding: VulnerabilityRecord {
                            host,
                            template_id,
                            name,
                            severity: Severity::from_label(&severity),
                            description,
                            matched_at,
                            raw: serde_json::from_str(&raw)?,
                        },
                        discovered_at: parse_time(&found)?,
                    })
                },
            )
            .collect()
    }
}
