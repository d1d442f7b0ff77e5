//! recon-engine: scan orchestration for the recon pipeline.
//!
//! Drives external discovery tools through three stages (subdomain
//! enumeration, HTTP probing, vulnerability scanning), merges their output
//! into the shared model, tolerates individual enumeration-tool failure and
//! persists results stage by stage.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod persist;
pub mod report;
pub mod runner;
pub mod stages;
pub mod stealth;

#[cfg(test)]
mod testing;
