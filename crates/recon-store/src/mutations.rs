//! Write operations for the scan store.
//!
//! Subdomain rows use upsert semantics keyed by (scan_id, hostname) so that
//! probe results overlay the row created at enumeration time.

use chrono::{SecondsFormat, Utc};
use recon_core::{HostDetails, ScanId, ScanStatus, VulnerabilityRecord};
use rusqlite::{params, OptionalExtension};

use crate::client::{SqliteStore, StoreError};
use crate::queries::{decode_details, SubdomainRow};

/// Fixed-width UTC timestamp so text ordering matches time ordering.
fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteStore {
    /// Insert a scan row in the `running` state.
    pub fn insert_scan(
        &self,
        target: &str,
        scan_type: &str,
        config: &serde_json::Value,
    ) -> Result<ScanId, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO scans (target, scan_type, status, started_at, config)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                target,
                scan_type,
                ScanStatus::Running.as_str(),
                now_stamp(),
                serde_json::to_string(config)?,
            ],
        )?;
        let id = ScanId(conn.last_insert_rowid());

        tracing::debug!(scan_id = %id, target = %target, "Scan row created");
        Ok(id)
    }

    /// Apply a terminal status. Rejects anything but `running -> terminal`.
    pub fn set_status(&self, scan_id: ScanId, status: ScanStatus) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM scans WHERE id = ?1",
                params![scan_id.0],
                |row| row.get(0),
            )
            .optional()?;

        let current = current
            .ok_or(StoreError::NotFound(scan_id))?
            .parse::<ScanStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        if !current.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                scan_id,
                from: current,
                to: status,
            });
        }

        conn.execute(
            "UPDATE scans SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_stamp(), scan_id.0],
        )?;

        tracing::debug!(scan_id = %scan_id, status = %status, "Scan status updated");
        Ok(())
    }

    /// Upsert a subdomain row, merging `details` over what is already stored.
    pub fn upsert_subdomain(
        &self,
        scan_id: ScanId,
        hostname: &str,
        details: &HostDetails,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<SubdomainRow> = tx
            .query_row(
                "SELECT subdomain, sources, url, ip_address, status_code, title, technologies,
                        discovered_at
                 FROM subdomains WHERE scan_id = ?1 AND subdomain = ?2",
                params![scan_id.0, hostname],
                SubdomainRow::from_row,
            )
            .optional()?;

        let merged = match existing {
            Some(row) => {
                let mut current = decode_details(&row)?;
                current.merge(details);
                current
            }
            None => details.clone(),
        };

        tx.execute(
            "INSERT INTO subdomains
                (scan_id, subdomain, sources, url, ip_address, status_code, title,
                 technologies, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(scan_id, subdomain) DO UPDATE SET
                sources = excluded.sources,
                url = excluded.url,
                ip_address = excluded.ip_address,
                status_code = excluded.status_code,
                title = excluded.title,
                technologies = excluded.technologies",
            params![
                scan_id.0,
                hostname,
                serde_json::to_string(&merged.sources)?,
                merged.url,
                merged.ip,
                merged.status_code,
                merged.title,
                serde_json::to_string(&merged.technologies)?,
                now_stamp(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Append one finding row.
    pub fn insert_vulnerability(
        &self,
        scan_id: ScanId,
        host: &str,
        finding: &VulnerabilityRecord,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO vulnerabilities
                (scan_id, target, template_id, name, severity, severity_rank, description,
                 matched_at, raw_output, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                scan_id.0,
                host,
                finding.template_id,
                finding.name,
                finding.severity.as_str(),
                finding.severity.rank(),
                finding.description,
                finding.matched_at,
                serde_json::to_string(&finding.raw)?,
                now_stamp(),
            ],
        )?;
        Ok(())
    }
}
