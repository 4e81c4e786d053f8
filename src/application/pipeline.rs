//! Lead Pipeline
//!
//! discovery → enrichment → scoring → export for one search. Cancellation
//! (external or from the run timeout) stops the remaining network work, but
//! whatever was gathered is still scored and exported.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::aggregator::FallbackAggregator;
use crate::domain::lead::{Lead, Tier};
use crate::ports::discovery::DiscoveryRequest;
use crate::ports::events::{Phase, PipelineEvent};
use crate::ports::export::{ExportError, ExportSummary, LeadExporter};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Unique leads after discovery and deduplication
    pub discovered: usize,
    pub leads: Vec<Lead>,
    /// Phase that was interrupted, if the run was cancelled
    pub cancelled_during: Option<Phase>,
    pub export: ExportSummary,
}

impl RunReport {
    pub fn tier_count(&self, tier: Tier) -> usize {
        self.leads.iter().filter(|l| l.tier == tier).count()
    }
}

pub struct LeadPipeline {
    aggregator: FallbackAggregator,
    exporter: Arc<dyn LeadExporter>,
    run_timeout: Option<Duration>,
}

impl LeadPipeline {
    pub fn new(aggregator: FallbackAggregator, exporter: Arc<dyn LeadExporter>) -> Self {
        Self {
            aggregator,
            exporter,
            run_timeout: None,
        }
    }

    /// Cancel the run once it has lasted this long
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn aggregator(&self) -> &FallbackAggregator {
        &self.aggregator
    }

    /// Run the whole pipeline for one search
    pub async fn run(
        &self,
        request: &DiscoveryRequest,
        cancel: CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let run_token = self.aggregator.cancellation().clone();
        let watchers = self.spawn_watchers(cancel, &run_token);

        tracing::info!(
            "Starting run: '{}' in '{}' (limit {})",
            request.term,
            request.location,
            request.limit
        );

        let mut cancelled_during = None;

        let discovered = self.aggregator.discover(request).await;
        let discovered_count = discovered.len();
        tracing::info!("Discovery finished with {} unique leads", discovered_count);
        if run_token.is_cancelled() {
            cancelled_during = Some(Phase::Discovery);
        }

        let mut leads = match cancelled_during {
            None => {
                let enriched = self.aggregator.enrich(discovered).await;
                if run_token.is_cancelled() {
                    cancelled_during = Some(Phase::Enrichment);
                }
                enriched
            }
            Some(_) => discovered,
        };

        for handle in watchers {
            handle.abort();
        }

        if let Some(phase) = cancelled_during {
            self.aggregator.events().emit(PipelineEvent::RunCancelled {
                phase,
                leads: leads.len(),
            });
        }

        self.aggregator.scoring().apply_all(&mut leads);
        self.aggregator.events().emit(PipelineEvent::StageCompleted {
            phase: Phase::Scoring,
            adapter: "scoring".to_string(),
            processed: leads.len(),
            skipped: 0,
            failed: 0,
        });

        let export = self.exporter.export(&leads)?;
        let report = RunReport {
            discovered: discovered_count,
            leads,
            cancelled_during,
            export,
        };

        tracing::info!(
            "Run complete: {} leads (A: {}, B: {}, C: {}) exported to {}",
            report.leads.len(),
            report.tier_count(Tier::A),
            report.tier_count(Tier::B),
            report.tier_count(Tier::C),
            report.export.destination
        );
        Ok(report)
    }

    /// Forward external cancellation and the run timeout onto the run token
    fn spawn_watchers(&self, cancel: CancellationToken, run_token: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);
        if cancel.is_cancelled() {
            run_token.cancel();
        }

        let inner = run_token.clone();
        handles.push(tokio::spawn(async move {
            cancel.cancelled().await;
            tracing::info!("Cancellation requested");
            inner.cancel();
        }));

        if let Some(timeout) = self.run_timeout {
            let inner = run_token.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                tracing::warn!("Run timeout of {:?} reached, cancelling", timeout);
                inner.cancel();
            }));
        }

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryQuotaStore;
    use crate::domain::lead::{signals, PartialLead};
    use crate::domain::quota::{QuotaLedger, QuotaLimit, QuotaPeriod};
    use crate::domain::scoring::ScoringEngine;
    use crate::domain::ScoringStatus;
    use crate::ports::discovery::{AdapterError, DiscoveryAdapter, DiscoveryPage};
    use crate::ports::mocks::{RecordingEventSink, RecordingExporter, ScriptedDiscovery, ScriptedEnrichment};
    use async_trait::async_trait;

    /// Discovery adapter that never answers
    struct HangingDiscovery;

    #[async_trait]
    impl DiscoveryAdapter for HangingDiscovery {
        fn name(&self) -> &str {
            "hanging"
        }

        fn quota_source(&self) -> &str {
            "hanging"
        }

        fn priority(&self) -> u32 {
            9
        }

        fn page_size(&self) -> usize {
            10
        }

        async fn discover(&self, _request: &DiscoveryRequest) -> Result<DiscoveryPage, AdapterError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(DiscoveryPage::default())
        }
    }

    fn ledger(sources: &[&str]) -> Arc<QuotaLedger> {
        let limits: Vec<QuotaLimit> = sources
            .iter()
            .map(|s| QuotaLimit::new(*s, QuotaPeriod::Daily, None))
            .collect();
        Arc::new(QuotaLedger::open(Arc::new(MemoryQuotaStore::new()), &limits).unwrap())
    }

    fn leads(count: usize) -> Vec<PartialLead> {
        (0..count)
            .map(|i| PartialLead::new(format!("Shop {}", i)).with_website(format!("https://shop{}.ca", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_full_run_scores_and_exports() {
        let sink = RecordingEventSink::new();
        let exporter = RecordingExporter::new();
        let aggregator = FallbackAggregator::new(
            ledger(&["yelp", "website"]),
            ScoringEngine::default(),
            Arc::new(sink.clone()),
        )
        .with_discovery(Arc::new(ScriptedDiscovery::new("yelp", 1).with_leads(leads(3))))
        .with_stage(
            Arc::new(ScriptedEnrichment::new("website", 1).with_signal(signals::HAS_BOOKING, true)),
            0.0,
        );

        let pipeline = LeadPipeline::new(aggregator, Arc::new(exporter.clone()));
        let report = pipeline
            .run(&DiscoveryRequest::new("HVAC", "Milton", 5), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.discovered, 3);
        assert!(report.cancelled_during.is_none());
        assert_eq!(report.export.count, 3);
        let exported = exporter.exported();
        assert_eq!(exported.len(), 3);
        for lead in &exported {
            assert!(matches!(lead.scoring_status(), ScoringStatus::Rescored(_)));
            // website 10 + https 5 + booking 12
            assert_eq!(lead.score, 27.0);
            assert_eq!(lead.tier, Tier::C);
        }
        assert_eq!(sink.count("run_cancelled"), 0);
    }

    #[tokio::test]
    async fn test_timeout_keeps_gathered_leads() {
        let sink = RecordingEventSink::new();
        let exporter = RecordingExporter::new();
        let website = ScriptedEnrichment::new("website", 1);
        let aggregator = FallbackAggregator::new(
            ledger(&["yelp", "hanging", "website"]),
            ScoringEngine::default(),
            Arc::new(sink.clone()),
        )
        .with_discovery(Arc::new(ScriptedDiscovery::new("yelp", 1).with_leads(leads(2))))
        .with_discovery(Arc::new(HangingDiscovery))
        .with_stage(Arc::new(website.clone()), 0.0);

        let pipeline = LeadPipeline::new(aggregator, Arc::new(exporter.clone()))
            .with_run_timeout(Some(Duration::from_millis(50)));
        let report = pipeline
            .run(&DiscoveryRequest::new("HVAC", "Milton", 10), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.cancelled_during, Some(Phase::Discovery));
        assert_eq!(report.leads.len(), 2);
        assert!(website.get_calls().is_empty());
        assert!(exporter.exported().iter().all(|l| l.tier != Tier::Unscored));
        assert!(matches!(
            sink.events().iter().find(|e| e.name() == "run_cancelled"),
            Some(PipelineEvent::RunCancelled { phase: Phase::Discovery, leads: 2 })
        ));
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let sink = RecordingEventSink::new();
        let exporter = RecordingExporter::new();
        let aggregator = FallbackAggregator::new(
            ledger(&["hanging"]),
            ScoringEngine::default(),
            Arc::new(sink.clone()),
        )
        .with_discovery(Arc::new(HangingDiscovery));
        let pipeline = LeadPipeline::new(aggregator, Arc::new(exporter.clone()));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let report = pipeline
            .run(&DiscoveryRequest::new("HVAC", "Milton", 10), cancel)
            .await
            .unwrap();
        assert_eq!(report.cancelled_during, Some(Phase::Discovery));
        assert!(report.leads.is_empty());
        assert_eq!(report.export.count, 0);
    }
}
