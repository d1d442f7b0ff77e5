//! Stage result persistence.
//!
//! Live hosts are written onto the subdomain row of their hostname, so a
//! probed host overlays the row created at enumeration time.

use recon_core::{HostDetails, LiveHostRecord, ScanId, SubdomainRecord, VulnerabilityRecord};
use recon_store::{ScanStore, StoreError};

/// Persist enumerated subdomains with their discovering tools.
pub fn persist_subdomains(
    store: &dyn ScanStore,
    scan_id: ScanId,
    subdomains: &[SubdomainRecord],
) -> Result<(), StoreError> {
    for record in subdomains {
        store.add_subdomain(scan_id, &record.hostname, &HostDetails::from(record))?;
    }
    tracing::debug!(scan_id = %scan_id, count = subdomains.len(), "Persisted subdomains");
    Ok(())
}

/// Overlay probe results onto subdomain rows.
pub fn persist_live_hosts(
    store: &dyn ScanStore,
    scan_id: ScanId,
    hosts: &[LiveHostRecord],
) -> Result<(), StoreError> {
    for host in hosts {
        store.add_subdomain(scan_id, &host.hostname, &HostDetails::from(host))?;
    }
    tracing::debug!(scan_id = %scan_id, count = hosts.len(), "Persisted live hosts");
    Ok(())
}

pub fn persist_vulnerabilities(
    store: &dyn ScanStore,
    scan_id: ScanId,
    findings: &[VulnerabilityRecord],
) -> Result<(), StoreError> {
    for finding in findings {
        store.add_vulnerability(scan_id, &finding.host, finding)?;
    }
    tracing::debug!(scan_id = %scan_id, count = findings.len(), "Persisted vulnerabilities");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use recon_core::Severity;
    use recon_store::SqliteStore;

    use super::*;

    #[test]
    fn live_hosts_overlay_enumerated_rows() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store
            .create_scan("example.com", "full_recon", &serde_json::json!({}))
            .unwrap();

        let mut www = SubdomainRecord::new("www.example.com", "subfinder");
        www.sources.insert("amass".to_string());
        persist_subdomains(
            &store,
            id,
            &[
                SubdomainRecord::new("api.example.com", "amass"),
                www,
            ],
        )
        .unwrap();

        let live = LiveHostRecord {
            url: "https://www.example.com".to_string(),
            hostname: "www.example.com".to_string(),
            ip: Some("93.184.216.34".to_string()),
            status_code: Some(200),
            title: Some("Home".to_string()),
            content_length: Some(1024),
            technologies: BTreeSet::from(["Nginx".to_string()]),
        };
        persist_live_hosts(&store, id, &[live]).unwrap();

        let rows = store.subdomains(id).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].is_live());
        let www = &rows[1];
        assert_eq!(www.details.url.as_deref(), Some("https://www.example.com"));
        assert_eq!(www.details.ip.as_deref(), Some("93.184.216.34"));
        assert_eq!(
            www.details.sources,
            BTreeSet::from(["amass".to_string(), "subfinder".to_string()])
        );
    }

    #[test]
    fn findings_are_appended() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store
            .create_scan("example.com", "full_recon", &serde_json::json!({}))
            .unwrap();
        let finding = VulnerabilityRecord {
            host: "https://www.example.com".to_string(),
            template_id: "git-config".to_string(),
            name: None,
            severity: Severity::Medium,
            description: None,
            matched_at: None,
            raw: serde_json::json!({ "template-id": "git-config" }),
        };
        persist_vulnerabilities(&store, id, &[finding.clone(), finding]).unwrap();
        assert_eq!(store.vulnerabilities(id).unwrap().len(), 2);
    }
}
