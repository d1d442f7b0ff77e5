//! Integration tests for recon-store against on-disk and in-memory SQLite.

use std::collections::BTreeSet;

use recon_core::{HostDetails, ScanId, ScanStatus, Severity, VulnerabilityRecord};
use recon_store::{ScanStore, SqliteStore, StoreError};

fn finding(host: &str, template_id: &str, severity: Severity) -> VulnerabilityRecord {
    VulnerabilityRecord {
        host: host.to_string(),
        template_id: template_id.to_string(),
        name: Some(format!("{template_id} check")),
        severity,
        description: None,
        matched_at: Some(format!("{host}/login")),
        raw: serde_json::json!({ "template-id": template_id, "host": host }),
    }
}

fn create(store: &SqliteStore, target: &str) -> ScanId {
    store
        .create_scan(target, "full_recon", &serde_json::json!({ "target": target }))
        .unwrap()
}

#[test]
fn scan_lifecycle_running_to_completed() {
    let store = SqliteStore::open_memory().unwrap();
    let id = create(&store, "example.com");

    let scan = store.latest_scan("example.com").unwrap().unwrap();
    assert_eq!(scan.id, id);
    assert_eq!(scan.status, ScanStatus::Running);
    assert_eq!(scan.scan_type, "full_recon");
    assert!(scan.completed_at.is_none());
    assert_eq!(scan.config["target"], "example.com");

    store.update_scan_status(id, ScanStatus::Completed).unwrap();
    let scan = store.latest_scan("example.com").unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Completed);
    assert!(scan.completed_at.is_some());
}

#[test]
fn terminal_scan_never_reenters_running() {
    let store = SqliteStore::open_memory().unwrap();
    let id = create(&store, "example.com");
    store.update_scan_status(id, ScanStatus::Failed).unwrap();

    let err = store.update_scan_status(id, ScanStatus::Running).unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let err = store
        .update_scan_status(id, ScanStatus::Completed)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidTransition {
            from: ScanStatus::Failed,
            to: ScanStatus::Completed,
            ..
        }
    ));
}

#[test]
fn status_update_for_unknown_scan() {
    let store = SqliteStore::open_memory().unwrap();
    let err = store
        .update_scan_status(ScanId(42), ScanStatus::Completed)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(ScanId(42))));
}

#[test]
fn subdomain_upsert_overlays_probe_details() {
    let store = SqliteStore::open_memory().unwrap();
    let id = create(&store, "example.com");

    let enumerated = HostDetails {
        sources: BTreeSet::from(["subfinder".to_string(), "amass".to_string()]),
        ..Default::default()
    };
    store
        .add_subdomain(id, "www.example.com", &enumerated)
        .unwrap();
    store
        .add_subdomain(id, "api.example.com", &HostDetails::default())
        .unwrap();

    let probed = HostDetails {
        url: Some("https://www.example.com".to_string()),
        status_code: Some(200),
        title: Some("Welcome".to_string()),
        technologies: BTreeSet::from(["nginx".to_string()]),
        ..Default::default()
    };
    store.add_subdomain(id, "www.example.com", &probed).unwrap();

    let rows = store.subdomains(id).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].hostname, "api.example.com");
    assert!(!rows[0].is_live());

    let www = &rows[1];
    assert_eq!(www.hostname, "www.example.com");
    assert!(www.is_live());
    assert_eq!(www.details.status_code, Some(200));
    assert_eq!(www.details.title.as_deref(), Some("Welcome"));
    assert_eq!(www.details.sources.len(), 2);
    assert!(www.details.technologies.contains("nginx"));
}

#[test]
fn vulnerabilities_ordered_by_severity() {
    let store = SqliteStore::open_memory().unwrap();
    let id = create(&store, "example.com");

    for (template, severity) in [
        ("tech-detect", Severity::Info),
        ("cve-2021-44228", Severity::Critical),
        ("exposed-panel", Severity::Medium),
        ("git-config", Severity::High),
    ] {
        store
            .add_vulnerability(id, "https://www.example.com", &finding("https://www.example.com", template, severity))
            .unwrap();
    }

    let rows = store.vulnerabilities(id).unwrap();
    let severities: Vec<_> = rows.iter().map(|r| r.finding.severity).collect();
    assert_eq!(
        severities,
        vec![
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Info
        ]
    );
    assert_eq!(rows[0].finding.template_id, "cve-2021-44228");
    assert_eq!(rows[0].finding.raw["template-id"], "cve-2021-44228");
}

#[test]
fn latest_scan_picks_most_recent_for_target() {
    let store = SqliteStore::open_memory().unwrap();
    let first = create(&store, "example.com");
    let _other = create(&store, "example.org");
    let second = create(&store, "example.com");
    assert_ne!(first, second);

    let latest = store.latest_scan("example.com").unwrap().unwrap();
    assert_eq!(latest.id, second);
    assert!(store.latest_scan("missing.example").unwrap().is_none());
}

#[test]
fn rows_survive_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("recon.db");

    let id = {
        let store = SqliteStore::open(&path).unwrap();
        let id = create(&store, "example.com");
        store
            .add_subdomain(id, "www.example.com", &HostDetails::default())
            .unwrap();
        id
    };

    let store = SqliteStore::open(&path).unwrap();
    let rows = store.subdomains(id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].hostname, "www.example.com");
}
