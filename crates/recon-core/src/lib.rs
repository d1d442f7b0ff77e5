//! recon-core: Shared types, scan configuration, and error handling for the recon pipeline.
//!
//! This crate provides the foundational types used across all recon components:
//! - Scan records and their per-stage results (subdomains, live hosts, findings)
//! - The scan request model with typed per-tool option bags
//! - Layered configuration loading
//! - Hostname validation
//! - Common error types

pub mod config;
pub mod error;
pub mod target;
pub mod types;

pub use config::{ScanRequest, ScanSettings};
pub use error::CoreError;
pub use types::{
    HostDetails, LiveHostRecord, ScanId, ScanMode, ScanRecord, ScanStatus, Severity,
    SubdomainRecord, VulnerabilityRecord,
};
