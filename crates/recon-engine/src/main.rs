//! CLI entry point for the recon scan engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use recon_core::config::load_layered;
use recon_core::{ScanRequest, ScanSettings};
use recon_store::SqliteStore;

use recon_engine::config::EngineConfig;
use recon_engine::orchestrator::ScanOrchestrator;
use recon_engine::report::{ReportFormat, ReportGenerator};
use recon_engine::runner::{verify_installation, ToolRunner};
use recon_engine::stealth::StealthPolicy;

#[derive(Parser)]
#[command(name = "recon")]
#[command(about = "Multi-stage reconnaissance: enumerate, probe, scan, report")]
#[command(version)]
struct Cli {
    /// Config file prefix (default: recon, i.e. recon.toml).
    #[arg(short, long, default_value = "recon", global = true)]
    config: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full scan against a target domain.
    Scan {
        target: String,

        /// Mode: stealth, normal, aggressive.
        #[arg(short, long)]
        mode: Option<String>,

        /// Named profile from the config file.
        #[arg(short, long)]
        profile: Option<String>,

        /// Output directory for results, reports and the database.
        #[arg(short, long)]
        output: Option<String>,

        /// Concurrency budget for enumeration tools.
        #[arg(short, long)]
        threads: Option<usize>,

        /// Per-request probe timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Render a report for the most recent scan of a target.
    Report {
        target: String,

        #[arg(short, long, default_value = "./reports")]
        output: PathBuf,

        /// html or json; defaults to the configured format.
        #[arg(short, long)]
        format: Option<String>,
    },
    /// Check which external tools are installed.
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let invocation_id = Uuid::new_v4();
    tracing::info!(invocation_id = %invocation_id, config = %cli.config, "recon starting");

    let layered = load_layered(&cli.config)?;
    let mut engine = EngineConfig::from_layered(&layered)?;

    match cli.command {
        Command::Scan {
            target,
            mode,
            profile,
            output,
            threads,
            timeout,
        } => {
            let mut settings = ScanSettings::from_layered(&layered, profile.as_deref())?;
            if let Some(mode) = mode {
                settings.mode = mode.parse()?;
            }
            if let Some(threads) = threads {
                settings.threads = threads;
            }
            if let Some(timeout) = timeout {
                settings.timeout_secs = timeout;
            }
            if let Some(output) = output {
                engine.output_dir = output;
            }

            let request = ScanRequest::new(&target, settings)?;
            std::fs::create_dir_all(&engine.output_dir)?;
            let store = SqliteStore::open(engine.database_path())?;

            let stealth = Arc::new(StealthPolicy::from_settings(request.settings()));
            let executor = Arc::new(ToolRunner::with_stealth(Arc::clone(&stealth)));
            let orchestrator =
                ScanOrchestrator::new(request, Arc::new(store), executor, stealth, &engine);

            let outcome = orchestrator.run().await?;

            let results_path = Path::new(&engine.output_dir).join("results.json");
            std::fs::write(&results_path, serde_json::to_string_pretty(&outcome)?)?;

            for failure in outcome.degraded_tools() {
                eprintln!("Warning: {} degraded: {}", failure.tool, failure.message);
            }
            println!("Results saved to {}", results_path.display());
            println!("Report generated: {}", outcome.report_path.display());
        }
        Command::Report {
            target,
            output,
            format,
        } => {
            let db_path = engine.database_path();
            if !db_path.exists() {
                anyhow::bail!("No scan results found at {}", db_path.display());
            }
            let store = SqliteStore::open(&db_path)?;
            let format = match format {
                Some(name) => name.parse::<ReportFormat>()?,
                None => engine.report_format,
            };
            let path = ReportGenerator::new(&store).generate(&target, &output, format)?;
            println!("Report generated: {}", path.display());
        }
        Command::Tools => {
            let runner = ToolRunner::new();
            for status in verify_installation(&runner, &engine.tools, Duration::from_secs(10)).await {
                let state = if status.installed { "installed" } else { "missing" };
                println!("{:<12} {:<10} {}", status.tool, state, status.detail);
            }
        }
    }

    tracing::info!(invocation_id = %invocation_id, "recon finished");
    Ok(())
}
