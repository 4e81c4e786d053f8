//! Fallback Aggregator
//!
//! Runs discovery adapters in priority order until the lead pool is full,
//! charging one quota unit per page, then walks the enrichment staircase.
//! A quota denial moves on to the next adapter; an adapter error is reported
//! and the chain continues.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::domain::dedup::merge_duplicates;
use crate::domain::lead::Lead;
use crate::domain::quota::{
    QuotaLedger, QuotaPeriod, DEFAULT_DAILY_ALERT_RATIO, DEFAULT_MONTHLY_ALERT_RATIO,
};
use crate::domain::scoring::ScoringEngine;
use crate::ports::discovery::{AdapterError, DiscoveryAdapter, DiscoveryRequest};
use crate::ports::enrichment::EnrichmentAdapter;
use crate::ports::events::{EventSink, Phase, PipelineEvent};

/// Aggregator tuning
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub monthly_alert_ratio: f64,
    pub daily_alert_ratio: f64,
    /// Leads enriched in parallel within one stage
    pub enrichment_concurrency: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            monthly_alert_ratio: DEFAULT_MONTHLY_ALERT_RATIO,
            daily_alert_ratio: DEFAULT_DAILY_ALERT_RATIO,
            enrichment_concurrency: 1,
        }
    }
}

/// One step of the enrichment staircase
#[derive(Clone)]
pub struct EnrichmentStage {
    pub adapter: Arc<dyn EnrichmentAdapter>,
    /// Current score a lead needs to reach this adapter
    pub min_score: f64,
}

impl std::fmt::Debug for EnrichmentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentStage")
            .field("adapter", &self.adapter.name())
            .field("min_score", &self.min_score)
            .finish()
    }
}

/// Per-stage counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageStats {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum LeadOutcome {
    Ineligible,
    QuotaDenied,
    Enriched(Lead),
    Failed(AdapterError),
    Cancelled,
}

pub struct FallbackAggregator {
    discovery: Vec<Arc<dyn DiscoveryAdapter>>,
    stages: Vec<EnrichmentStage>,
    ledger: Arc<QuotaLedger>,
    scoring: ScoringEngine,
    events: Arc<dyn EventSink>,
    config: AggregatorConfig,
    cancel: CancellationToken,
}

impl FallbackAggregator {
    pub fn new(ledger: Arc<QuotaLedger>, scoring: ScoringEngine, events: Arc<dyn EventSink>) -> Self {
        Self {
            discovery: Vec::new(),
            stages: Vec::new(),
            ledger,
            scoring,
            events,
            config: AggregatorConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Add a discovery adapter; the chain stays sorted by priority
    pub fn with_discovery(mut self, adapter: Arc<dyn DiscoveryAdapter>) -> Self {
        self.discovery.push(adapter);
        self.discovery.sort_by_key(|a| a.priority());
        self
    }

    /// Add an enrichment stage; stages stay sorted by adapter priority
    pub fn with_stage(mut self, adapter: Arc<dyn EnrichmentAdapter>, min_score: f64) -> Self {
        self.stages.push(EnrichmentStage { adapter, min_score });
        self.stages.sort_by_key(|s| s.adapter.priority());
        self
    }

    pub fn with_config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub fn stages(&self) -> &[EnrichmentStage] {
        &self.stages
    }

    /// Collect up to `request.limit` leads across the chain, then merge duplicates
    pub async fn discover(&self, request: &DiscoveryRequest) -> Vec<Lead> {
        let limit = request.limit;
        let mut pool: Vec<Lead> = Vec::with_capacity(limit);

        'chain: for adapter in &self.discovery {
            if pool.len() >= limit {
                break;
            }

            let mut offset = 0usize;
            loop {
                let wanted = (limit - pool.len()).min(adapter.page_size().max(1));
                if wanted == 0 {
                    break;
                }
                if self.cancel.is_cancelled() {
                    break 'chain;
                }
                if !self.reserve(adapter.name(), adapter.quota_source(), Phase::Discovery, None) {
                    break;
                }

                let page = request.page(wanted, offset);
                let result = tokio::select! {
                    _ = self.cancel.cancelled() => break 'chain,
                    result = adapter.discover(&page) => result,
                };

                match result {
                    Ok(found) => {
                        let mapped = found.leads.len().min(wanted);
                        pool.extend(
                            found
                                .leads
                                .into_iter()
                                .take(wanted)
                                .map(|p| Lead::from_partial(p, adapter.name())),
                        );
                        // Paging follows raw records; dropped ones still advance the offset
                        offset += found.fetched;
                        tracing::info!(
                            "{}: {} leads from {} records at offset {} (pool {}/{})",
                            adapter.name(),
                            mapped,
                            found.fetched,
                            page.offset,
                            pool.len(),
                            limit
                        );
                        if found.exhausted || found.fetched == 0 {
                            tracing::debug!("{} exhausted", adapter.name());
                            break;
                        }
                    }
                    Err(e) if e.is_cancelled() => break 'chain,
                    Err(e) => {
                        self.report_failure(adapter.name(), Phase::Discovery, None, &e);
                        break;
                    }
                }
            }
        }

        merge_duplicates(pool)
    }

    /// Score every lead, then run each stage on the leads that clear its bar
    pub async fn enrich(&self, mut leads: Vec<Lead>) -> Vec<Lead> {
        self.scoring.apply_all(&mut leads);

        for stage in &self.stages {
            if self.cancel.is_cancelled() {
                break;
            }
            let stats = self.run_stage(stage, &mut leads).await;
            self.scoring.apply_all(&mut leads);

            self.events.emit(PipelineEvent::StageCompleted {
                phase: Phase::Enrichment,
                adapter: stage.adapter.name().to_string(),
                processed: stats.processed,
                skipped: stats.skipped,
                failed: stats.failed,
            });
        }

        leads
    }

    async fn run_stage(&self, stage: &EnrichmentStage, leads: &mut [Lead]) -> StageStats {
        let concurrency = self.config.enrichment_concurrency.max(1);
        let outcomes: Vec<LeadOutcome> = stream::iter(leads.iter())
            .map(|lead| self.enrich_one(stage, lead))
            .buffered(concurrency)
            .collect()
            .await;

        let adapter = stage.adapter.as_ref();
        let mut stats = StageStats::default();
        for (lead, outcome) in leads.iter_mut().zip(outcomes) {
            match outcome {
                LeadOutcome::Ineligible | LeadOutcome::Cancelled => stats.skipped += 1,
                LeadOutcome::QuotaDenied => {
                    lead.add_note(format!(
                        "{} skipped: {} quota exhausted",
                        adapter.name(),
                        adapter.quota_source()
                    ));
                    stats.skipped += 1;
                }
                LeadOutcome::Enriched(enriched) => {
                    lead.absorb(enriched, adapter.name());
                    stats.processed += 1;
                }
                LeadOutcome::Failed(error) => {
                    lead.add_note(format!("{} enrichment failed: {}", adapter.name(), error));
                    self.report_failure(adapter.name(), Phase::Enrichment, Some(&lead.name), &error);
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    async fn enrich_one(&self, stage: &EnrichmentStage, lead: &Lead) -> LeadOutcome {
        let adapter = stage.adapter.as_ref();
        if lead.score < stage.min_score || !adapter.applies_to(lead) {
            return LeadOutcome::Ineligible;
        }
        if self.cancel.is_cancelled() {
            return LeadOutcome::Cancelled;
        }
        if !self.reserve(
            adapter.name(),
            adapter.quota_source(),
            Phase::Enrichment,
            Some(&lead.name),
        ) {
            return LeadOutcome::QuotaDenied;
        }

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return LeadOutcome::Cancelled,
            result = adapter.enrich(lead) => result,
        };
        match result {
            Ok(enriched) => LeadOutcome::Enriched(enriched),
            Err(e) if e.is_cancelled() => LeadOutcome::Cancelled,
            Err(e) => LeadOutcome::Failed(e),
        }
    }

    /// Claim one unit for `source`, reporting denials and threshold crossings
    fn reserve(&self, adapter: &str, source: &str, phase: Phase, lead: Option<&str>) -> bool {
        if !self.ledger.reserve(source) {
            tracing::debug!("{} quota denied for {}", source, adapter);
            self.events.emit(PipelineEvent::QuotaSkip {
                adapter: adapter.to_string(),
                quota_source: source.to_string(),
                phase,
                lead: lead.map(str::to_string),
            });
            return false;
        }

        if let Some(status) = self.ledger.status(source) {
            let ratio = match status.period {
                QuotaPeriod::Daily => self.config.daily_alert_ratio,
                QuotaPeriod::Monthly => self.config.monthly_alert_ratio,
            };
            if let (true, Some(cap)) = (status.crossed_threshold(ratio), status.cap) {
                self.events.emit(PipelineEvent::QuotaThresholdCrossed {
                    source: source.to_string(),
                    used: status.used,
                    cap,
                    period: status.period,
                    ratio,
                });
            }
        }
        true
    }

    fn report_failure(&self, adapter: &str, phase: Phase, lead: Option<&str>, error: &AdapterError) {
        let message = error.to_string();
        match lead {
            Some(name) => self.events.emit(PipelineEvent::LeadEnrichmentFailed {
                adapter: adapter.to_string(),
                lead: name.to_string(),
                error: message.clone(),
            }),
            None => self.events.emit(PipelineEvent::AdapterFailed {
                adapter: adapter.to_string(),
                phase,
                error: message.clone(),
            }),
        }
        if let Some(kind) = error.fetch_kind() {
            self.events.emit(PipelineEvent::FetchFailed {
                adapter: adapter.to_string(),
                kind,
                error: message,
            });
        }
    }
}
