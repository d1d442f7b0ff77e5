//! recon-store: persistence for scan records.
//!
//! This crate is the single writer of scan rows and status transitions.
//! The orchestrator writes through [`ScanStore`] stage by stage; report
//! projection reads back through the same trait.

pub mod client;
pub mod mutations;
pub mod queries;

use recon_core::{HostDetails, ScanId, ScanStatus, VulnerabilityRecord};

pub use client::{SqliteStore, StoreError};
pub use queries::{StoredScan, StoredSubdomain, StoredVulnerability};

/// The storage contract consumed by the orchestrator and report projection.
pub trait ScanStore: Send + Sync {
    /// Create a scan row in the `running` state and return its id.
    fn create_scan(
        &self,
        target: &str,
        scan_type: &str,
        config: &serde_json::Value,
    ) -> Result<ScanId, StoreError>;

    /// Move a scan to a terminal status, stamping its completion time.
    fn update_scan_status(&self, scan_id: ScanId, status: ScanStatus) -> Result<(), StoreError>;

    /// Upsert a subdomain row by hostname, overlaying any known details.
    fn add_subdomain(
        &self,
        scan_id: ScanId,
        hostname: &str,
        details: &HostDetails,
    ) -> Result<(), StoreError>;

    /// Append one finding.
    fn add_vulnerability(
        &self,
        scan_id: ScanId,
        host: &str,
        finding: &VulnerabilityRecord,
    ) -> Result<(), StoreError>;

    /// Most recently started scan for a target, if any.
    fn latest_scan(&self, target: &str) -> Result<Option<StoredScan>, StoreError>;

    /// Subdomain rows of a scan, alphabetically by hostname.
    fn subdomains(&self, scan_id: ScanId) -> Result<Vec<StoredSubdomain>, StoreError>;

    /// Findings of a scan, most severe first.
    fn vulnerabilities(&self, scan_id: ScanId) -> Result<Vec<StoredVulnerability>, StoreError>;
}

impl ScanStore for SqliteStore {
    fn create_scan(
        &self,
        target: &str,
        scan_type: &str,
        config: &serde_json::Value,
    ) -> Result<ScanId, StoreError> {
        self.insert_scan(target, scan_type, config)
    }

    fn update_scan_status(&self, scan_id: ScanId, status: ScanStatus) -> Result<(), StoreError> {
        self.set_status(scan_id, status)
    }

    fn add_subdomain(
        &self,
        scan_id: ScanId,
        hostname: &str,
        details: &HostDetails,
    ) -> Result<(), StoreError> {
        self.upsert_subdomain(scan_id, hostname, details)
    }

    fn add_vulnerability(
        &self,
        scan_id: ScanId,
        host: &str,
        finding: &VulnerabilityRecord,
    ) -> Result<(), StoreError> {
        self.insert_vulnerability(scan_id, host, finding)
    }

    fn latest_scan(&self, target: &str) -> Result<Option<StoredScan>, StoreError> {
        self.find_latest_scan(target)
    }

    fn subdomains(&self, scan_id: ScanId) -> Result<Vec<StoredSubdomain>, StoreError> {
        self.list_subdomains(scan_id)
    }

    fn vulnerabilities(&self, scan_id: ScanId) -> Result<Vec<StoredVulnerability>, StoreError> {
        self.list_vulnerabilities(scan_id)
    }
}
