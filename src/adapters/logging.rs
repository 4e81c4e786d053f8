//! Logging Adapter
//!
//! Subscriber setup for the binary and an `EventSink` that turns pipeline
//! events into structured `tracing` events.

use tracing_subscriber::{fmt, EnvFilter};

use crate::ports::events::{EventSink, PipelineEvent};

/// Filter directive chosen by CLI flags, falling back to the configured level
pub fn filter_directive(verbose: bool, debug: bool, configured: &str) -> String {
    if debug {
        "debug".to_string()
    } else if verbose {
        "info".to_string()
    } else if configured.trim().is_empty() {
        "warn".to_string()
    } else {
        configured.trim().to_string()
    }
}

/// Initialize logging; RUST_LOG wins over flags and config
pub fn init_logging(
    verbose: bool,
    debug: bool,
    configured: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let directive = filter_directive(verbose, debug, configured);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    fmt().with_env_filter(filter).with_target(false).try_init()
}

/// Forwards pipeline events to the active tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: PipelineEvent) {
        let name = event.name();
        match event {
            PipelineEvent::QuotaSkip {
                adapter,
                quota_source,
                phase,
                lead,
            } => tracing::info!(
                event = name,
                adapter = %adapter,
                quota_source = %quota_source,
                phase = %phase,
                lead = lead.as_deref().unwrap_or("-"),
                "Quota exhausted, skipping {}",
                adapter
            ),
            PipelineEvent::QuotaThresholdCrossed {
                source,
                used,
                cap,
                period,
                ratio,
            } => tracing::warn!(
                event = name,
                source = %source,
                used,
                cap,
                period = %period,
                ratio,
                "{} quota at {}/{} ({:.0}% of {} budget)",
                source,
                used,
                cap,
                ratio * 100.0,
                period
            ),
            PipelineEvent::AdapterFailed {
                adapter,
                phase,
                error,
            } => tracing::warn!(
                event = name,
                adapter = %adapter,
                phase = %phase,
                error = %error,
                "{} failed during {}: {}",
                adapter,
                phase,
                error
            ),
            PipelineEvent::FetchFailed {
                adapter,
                kind,
                error,
            } => tracing::warn!(
                event = name,
                adapter = %adapter,
                kind = ?kind,
                error = %error,
                "Fetch failed for {}: {}",
                adapter,
                error
            ),
            PipelineEvent::LeadEnrichmentFailed {
                adapter,
                lead,
                error,
            } => tracing::warn!(
                event = name,
                adapter = %adapter,
                lead = %lead,
                error = %error,
                "Could not enrich '{}' with {}: {}",
                lead,
                adapter,
                error
            ),
            PipelineEvent::StageCompleted {
                phase,
                adapter,
                processed,
                skipped,
                failed,
            } => tracing::info!(
                event = name,
                phase = %phase,
                adapter = %adapter,
                processed,
                skipped,
                failed,
                "{} {} stage: {} processed, {} skipped, {} failed",
                adapter,
                phase,
                processed,
                skipped,
                failed
            ),
            PipelineEvent::RunCancelled { phase, leads } => tracing::warn!(
                event = name,
                phase = %phase,
                leads,
                "Run cancelled during {} with {} leads gathered",
                phase,
                leads
            ),
        }
    }
}
