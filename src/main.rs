//! Lead Scout - quota-aware lead discovery, enrichment and scoring

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use lead_scout::adapters::cli::{self, Command, QuotaCmd, RunCmd};
use lead_scout::adapters::logging::{init_logging, TracingEventSink};
use lead_scout::application::{build_pipeline, open_ledger};
use lead_scout::config::{load_config, AppConfig};
use lead_scout::domain::Tier;
use lead_scout::ports::discovery::DiscoveryRequest;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (API keys go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = cli::init();

    match app.command {
        Command::Run(cmd) => run_command(cmd, app.verbose, app.debug).await,
        Command::Quota(cmd) => quota_command(cmd, app.verbose, app.debug),
    }
}

fn load(path: &std::path::Path, verbose: bool, debug: bool) -> Result<AppConfig> {
    let config = load_config(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    init_logging(verbose, debug, &config.logging.level)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    Ok(config)
}

async fn run_command(cmd: RunCmd, verbose: bool, debug: bool) -> Result<()> {
    let mut config = load(&cmd.config, verbose, debug)?;
    if let Some(secs) = cmd.timeout {
        config.pipeline.run_timeout_secs = Some(secs);
    }

    let output = match cmd.output {
        Some(ref path) => path.display().to_string(),
        None => config.pipeline.output.clone(),
    };
    let limit = cmd.limit.unwrap_or(config.pipeline.default_limit);

    let cancel = CancellationToken::new();
    let (pipeline, ledger) = build_pipeline(
        &config,
        &output,
        cmd.format,
        Arc::new(TracingEventSink),
        cancel.clone(),
    )
    .context("Failed to build pipeline")?;

    // Setup Ctrl+C handler
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received, finishing with leads gathered so far");
        shutdown.cancel();
    });

    let request = DiscoveryRequest::new(cmd.term.clone(), cmd.location.clone(), limit);
    let report = pipeline.run(&request, cancel).await.context("Run failed")?;

    println!(
        "{} leads for '{}' in {} -> {}",
        report.leads.len(),
        cmd.term,
        cmd.location,
        report.export.destination
    );
    println!(
        "  Tier A: {}  Tier B: {}  Tier C: {}",
        report.tier_count(Tier::A),
        report.tier_count(Tier::B),
        report.tier_count(Tier::C)
    );
    if let Some(phase) = report.cancelled_during {
        println!("  Cancelled during {}; partial results exported", phase);
    }
    for status in ledger.statuses() {
        println!("  {}", status);
    }

    Ok(())
}

fn quota_command(cmd: QuotaCmd, verbose: bool, debug: bool) -> Result<()> {
    let config = load(&cmd.config, verbose, debug)?;
    let ledger = open_ledger(&config).context("Failed to open quota ledger")?;
    let statuses = ledger.statuses();

    match cmd.format.as_str() {
        "json" => {
            let rows: Vec<serde_json::Value> = statuses
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "source": s.source,
                        "period": s.period,
                        "used": s.used,
                        "cap": s.cap,
                        "remaining": s.remaining(),
                        "period_start": s.period_start,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            for status in &statuses {
                println!("{}", status);
            }
        }
    }

    Ok(())
}
