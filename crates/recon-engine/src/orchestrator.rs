//! Scan orchestration.
//!
//! Runs the three stages in sequence for one target, persisting each stage's
//! results before the next starts. The scan row is created `running` and
//! ends in exactly one of `completed` or `failed`.

use std::path::PathBuf;
use std::sync::Arc;

use recon_core::{ScanId, ScanRecord, ScanRequest, ScanStatus};
use recon_store::ScanStore;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{ScanExecutionError, StageError};
use crate::persist;
use crate::report::{ReportFormat, ReportGenerator};
use crate::runner::ToolExecutor;
use crate::stages::{
    HttpProbeOutcome, HttpProbeStage, Stage, StageContext, SubdomainOutcome, SubdomainStage,
    ToolFailure, VulnerabilityOutcome, VulnerabilityStage,
};
use crate::stealth::StealthPolicy;

/// Scan type recorded on every row this orchestrator creates.
pub const SCAN_TYPE: &str = "full_recon";

/// The consolidated result of a completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub record: ScanRecord,
    pub subdomain_results: SubdomainOutcome,
    pub http_results: HttpProbeOutcome,
    pub vulnerability_results: VulnerabilityOutcome,
    pub report_path: PathBuf,
}

impl ScanOutcome {
    pub fn scan_id(&self) -> ScanId {
        self.record.id
    }

    /// Enumeration tools that failed without failing the scan.
    pub fn degraded_tools(&self) -> &[ToolFailure] {
        &self.subdomain_results.errors
    }
}

pub struct ScanOrchestrator {
    request: Arc<ScanRequest>,
    store: Arc<dyn ScanStore>,
    ctx: StageContext,
    output_dir: PathBuf,
    report_format: ReportFormat,
}

impl ScanOrchestrator {
    pub fn new(
        request: ScanRequest,
        store: Arc<dyn ScanStore>,
        executor: Arc<dyn ToolExecutor>,
        stealth: Arc<StealthPolicy>,
        engine: &EngineConfig,
    ) -> Self {
        let request = Arc::new(request);
        let ctx = StageContext::new(executor, stealth, Arc::clone(&request), engine);
        Self {
            request,
            store,
            ctx,
            output_dir: PathBuf::from(&engine.output_dir),
            report_format: engine.report_format,
        }
    }

    /// Run the full pipeline. On any fatal error the scan is marked failed
    /// and the error returned.
    pub async fn run(&self) -> Result<ScanOutcome, ScanExecutionError> {
        let target = self.request.target();
        let config = self
            .request
            .to_json()
            .map_err(|e| ScanExecutionError::Setup(e.to_string()))?;
        let scan_id = self
            .store
            .create_scan(target, SCAN_TYPE, &config)
            .map_err(|e| ScanExecutionError::Setup(e.to_string()))?;

        tracing::info!(scan_id = %scan_id, target = %target, mode = %self.request.mode(), "Scan started");

        let mut record = ScanRecord::running(scan_id, target, config);
        match self.execute(&mut record).await {
            Ok(outcome) => {
                tracing::info!(
                    scan_id = %scan_id,
                    subdomains = outcome.record.subdomains.len(),
                    live_hosts = outcome.record.live_hosts.len(),
                    vulnerabilities = outcome.record.vulnerabilities.len(),
                    degraded_tools = outcome.degraded_tools().len(),
                    "Scan completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                tracing::error!(scan_id = %scan_id, error = %err, "Scan failed");
                if let Err(e) = self.store.update_scan_status(scan_id, ScanStatus::Failed) {
                    tracing::error!(scan_id = %scan_id, error = %e, "Could not mark scan failed");
                }
                Err(err)
            }
        }
    }

    async fn execute(&self, record: &mut ScanRecord) -> Result<ScanOutcome, ScanExecutionError> {
        let scan_id = record.id;
        let store = self.store.as_ref();
        let stage_failed = |stage: &'static str| {
            move |source: StageError| ScanExecutionError::Stage {
                scan_id,
                stage,
                source,
            }
        };
        let store_failed = |source| ScanExecutionError::Store { scan_id, source };

        let subdomain_stage = SubdomainStage::new(self.ctx.clone());
        let subdomain_results = subdomain_stage
            .run(self.request.target())
            .await
            .map_err(stage_failed(subdomain_stage.name()))?;
        persist::persist_subdomains(store, scan_id, &subdomain_results.subdomains)
            .map_err(store_failed)?;
        record.subdomains = subdomain_results.subdomains.clone();

        let http_stage = HttpProbeStage::new(self.ctx.clone());
        let http_results = http_stage
            .run(&subdomain_results.hostnames())
            .await
            .map_err(stage_failed(http_stage.name()))?;
        persist::persist_live_hosts(store, scan_id, &http_results.live_hosts)
            .map_err(store_failed)?;
        record.live_hosts = http_results.live_hosts.clone();

        let vuln_stage = VulnerabilityStage::new(self.ctx.clone());
        let vulnerability_results = vuln_stage
            .run(&http_results.urls())
            .await
            .map_err(stage_failed(vuln_stage.name()))?;
        persist::persist_vulnerabilities(store, scan_id, &vulnerability_results.vulnerabilities)
            .map_err(store_failed)?;
        record.vulnerabilities = vulnerability_results.vulnerabilities.clone();

        let report_path = ReportGenerator::new(store)
            .generate(self.request.target(), &self.output_dir, self.report_format)
            .map_err(|source| ScanExecutionError::Report { scan_id, source })?;

        store
            .update_scan_status(scan_id, ScanStatus::Completed)
            .map_err(store_failed)?;
        if let Err(e) = record.finish(ScanStatus::Completed) {
            tracing::warn!(scan_id = %scan_id, error = %e, "In-memory scan record already terminal");
        }

        Ok(ScanOutcome {
            record: record.clone(),
            subdomain_results,
            http_results,
            vulnerability_results,
            report_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use recon_core::{ScanMode, ScanSettings};
    use recon_store::SqliteStore;

    use super::*;
    use crate::runner::ExitClassification;
    use crate::testing::ScriptedExecutor;

    const PROBE: &str = r#"{"url":"https://www.example.com","input":"www.example.com","status_code":200,"title":"Admin Login","tech":["Nginx"]}"#;
    const FINDING: &str = r#"{"template-id":"git-config","info":{"name":"Git Config","severity":"medium"},"host":"https://www.example.com","matched-at":"https://www.example.com/.git/config"}"#;

    struct Harness {
        store: SqliteStore,
        executor: Arc<ScriptedExecutor>,
        _dir: tempfile::TempDir,
        orchestrator: ScanOrchestrator,
    }

    fn harness(executor: ScriptedExecutor) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_memory().unwrap();
        let executor = Arc::new(executor);
        let settings = ScanSettings {
            mode: ScanMode::Aggressive,
            ..Default::default()
        };
        let engine = EngineConfig {
            output_dir: dir.path().to_string_lossy().into_owned(),
            tool_timeout_secs: 5,
            ..Default::default()
        };
        let request = ScanRequest::new("example.com", settings).unwrap();
        let stealth = Arc::new(StealthPolicy::from_settings(request.settings()));
        let orchestrator = ScanOrchestrator::new(
            request,
            Arc::new(store.clone()),
            Arc::clone(&executor) as Arc<dyn ToolExecutor>,
            stealth,
            &engine,
        );
        assert_eq!(engine.tool_timeout(), Duration::from_secs(5));
        Harness {
            store,
            executor,
            _dir: dir,
            orchestrator,
        }
    }

    fn enumeration() -> ScriptedExecutor {
        ScriptedExecutor::new()
            .succeed("subfinder", "www.example.com\napi.example.com\n")
            .succeed("amass", "api.example.com\n")
            .fail("assetfinder", ExitClassification::NotFound)
    }

    #[tokio::test]
    async fn full_pipeline_completes_with_degraded_tool() {
        let h = harness(
            enumeration()
                .succeed("httpx", PROBE)
                .succeed("nuclei", FINDING),
        );
        let outcome = h.orchestrator.run().await.unwrap();

        assert_eq!(outcome.record.status, ScanStatus::Completed);
        assert!(outcome.record.completed_at.is_some());
        assert_eq!(outcome.record.subdomains.len(), 2);
        assert_eq!(outcome.record.live_hosts.len(), 1);
        assert_eq!(outcome.record.vulnerabilities.len(), 1);
        assert_eq!(outcome.degraded_tools().len(), 1);
        assert_eq!(outcome.degraded_tools()[0].tool, "assetfinder");
        assert!(outcome.report_path.exists());
        assert_eq!(
            outcome.http_results.analyzed[0].interesting(),
            [
                "HTTP 200 OK",
                "Admin/Login page detected",
                "Technologies: Nginx"
            ]
        );

        let scan = h.store.latest_scan("example.com").unwrap().unwrap();
        assert_eq!(scan.id, outcome.scan_id());
        assert_eq!(scan.status, ScanStatus::Completed);
        assert_eq!(scan.scan_type, SCAN_TYPE);
        assert_eq!(scan.config["target"], "example.com");
        assert_eq!(scan.config["mode"], "aggressive");

        let rows = h.store.subdomains(scan.id).unwrap();
        let live: Vec<_> = rows.iter().filter(|r| r.is_live()).collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].hostname, "www.example.com");
        assert_eq!(live[0].details.title.as_deref(), Some("Admin Login"));
        assert_eq!(h.store.vulnerabilities(scan.id).unwrap().len(), 1);

        // Probing and scanning each see the previous stage's output.
        let httpx = &h.executor.calls_for("httpx")[0];
        assert_eq!(httpx.existing_files.len(), 1);
        assert_eq!(h.executor.calls_for("nuclei").len(), 1);
    }

    #[tokio::test]
    async fn probe_failure_marks_scan_failed() {
        let h = harness(enumeration().fail("httpx", ExitClassification::Timeout));
        let err = h.orchestrator.run().await.unwrap_err();

        assert!(matches!(
            err,
            ScanExecutionError::Stage { stage: "http", .. }
        ));
        let scan_id = err.scan_id().unwrap();
        let scan = h.store.latest_scan("example.com").unwrap().unwrap();
        assert_eq!(scan.id, scan_id);
        assert_eq!(scan.status, ScanStatus::Failed);
        assert!(scan.completed_at.is_some());
        // Enumeration results persisted before the failure stay.
        assert_eq!(h.store.subdomains(scan_id).unwrap().len(), 2);
        assert!(h.executor.calls_for("nuclei").is_empty());
    }

    #[tokio::test]
    async fn scanner_failure_marks_scan_failed() {
        let h = harness(
            enumeration()
                .succeed("httpx", PROBE)
                .fail("nuclei", ExitClassification::NotFound),
        );
        let err = h.orchestrator.run().await.unwrap_err();

        assert!(matches!(
            err,
            ScanExecutionError::Stage {
                stage: "vulnerability",
                ..
            }
        ));
        let scan = h.store.latest_scan("example.com").unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Failed);
    }

    #[tokio::test]
    async fn empty_enumeration_still_completes() {
        let h = harness(
            ScriptedExecutor::new()
                .fail("subfinder", ExitClassification::Timeout)
                .fail("amass", ExitClassification::Timeout)
                .fail("assetfinder", ExitClassification::Timeout),
        );
        let outcome = h.orchestrator.run().await.unwrap();

        assert_eq!(outcome.record.status, ScanStatus::Completed);
        assert!(outcome.record.subdomains.is_empty());
        assert_eq!(outcome.degraded_tools().len(), 3);
        assert_eq!(h.executor.call_count(), 3);
    }
}
