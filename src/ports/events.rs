//! Pipeline events
//!
//! Structured notifications for logging and alerting. Sinks must not block.

use serde::Serialize;
use std::fmt;

use super::fetch::FetchFailureKind;
use crate::domain::quota::QuotaPeriod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Discovery,
    Enrichment,
    Scoring,
    Export,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Discovery => write!(f, "discovery"),
            Phase::Enrichment => write!(f, "enrichment"),
            Phase::Scoring => write!(f, "scoring"),
            Phase::Export => write!(f, "export"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Ledger refused a reservation; the adapter was skipped
    QuotaSkip {
        adapter: String,
        quota_source: String,
        phase: Phase,
        lead: Option<String>,
    },

    /// Usage moved past the alert ratio for its period
    QuotaThresholdCrossed {
        source: String,
        used: u64,
        cap: u64,
        period: QuotaPeriod,
        ratio: f64,
    },

    /// A discovery adapter errored and was dropped from the chain
    AdapterFailed {
        adapter: String,
        phase: Phase,
        error: String,
    },

    /// Network failure behind an adapter error
    FetchFailed {
        adapter: String,
        kind: FetchFailureKind,
        error: String,
    },

    /// One lead could not be enriched by one adapter
    LeadEnrichmentFailed {
        adapter: String,
        lead: String,
        error: String,
    },

    StageCompleted {
        phase: Phase,
        adapter: String,
        processed: usize,
        skipped: usize,
        failed: usize,
    },

    RunCancelled {
        phase: Phase,
        leads: usize,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::QuotaSkip { .. } => "quota_skip",
            PipelineEvent::QuotaThresholdCrossed { .. } => "quota_threshold_crossed",
            PipelineEvent::AdapterFailed { .. } => "adapter_failed",
            PipelineEvent::FetchFailed { .. } => "fetch_failed",
            PipelineEvent::LeadEnrichmentFailed { .. } => "lead_enrichment_failed",
            PipelineEvent::StageCompleted { .. } => "stage_completed",
            PipelineEvent::RunCancelled { .. } => "run_cancelled",
        }
    }
}

/// Receives pipeline events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: PipelineEvent) {}
}
