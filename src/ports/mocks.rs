//! Scripted port implementations
//!
//! Deterministic adapters, sinks and exporters that record their calls.
//! Used by unit and integration tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::discovery::{AdapterError, DiscoveryAdapter, DiscoveryPage, DiscoveryRequest};
use super::enrichment::EnrichmentAdapter;
use super::events::{EventSink, PipelineEvent};
use super::export::{ExportError, ExportSummary, LeadExporter};
use crate::domain::lead::{Lead, PartialLead, SignalValue};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Discovery adapter that serves a fixed result list page by page
#[derive(Debug, Clone)]
pub struct ScriptedDiscovery {
    name: String,
    quota_source: String,
    priority: u32,
    page_size: usize,
    leads: Vec<PartialLead>,
    failure: Option<AdapterError>,
    calls: Arc<Mutex<Vec<DiscoveryRequest>>>,
}

impl ScriptedDiscovery {
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            quota_source: name.to_string(),
            priority,
            page_size: 50,
            leads: Vec::new(),
            failure: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Builder method to set the results served across pages
    pub fn with_leads(mut self, leads: Vec<PartialLead>) -> Self {
        self.leads = leads;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_quota_source(mut self, source: &str) -> Self {
        self.quota_source = source.to_string();
        self
    }

    /// Builder method to make every call fail
    pub fn failing(mut self, error: AdapterError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<DiscoveryRequest> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl DiscoveryAdapter for ScriptedDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn quota_source(&self) -> &str {
        &self.quota_source
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    /// Nameless records count toward the page but are dropped, as a real
    /// provider's unusable rows would be
    async fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryPage, AdapterError> {
        lock(&self.calls).push(request.clone());
        if let Some(ref error) = self.failure {
            return Err(error.clone());
        }

        let take = request.limit.min(self.page_size);
        let records: Vec<&PartialLead> = self.leads.iter().skip(request.offset).take(take).collect();
        let fetched = records.len();
        let exhausted = request.offset + fetched >= self.leads.len();
        let leads = records
            .into_iter()
            .filter(|p| !p.name.trim().is_empty())
            .cloned()
            .collect();
        Ok(DiscoveryPage::new(leads, fetched, exhausted))
    }
}

/// Enrichment adapter that sets fixed signals on every lead it sees
#[derive(Debug, Clone)]
pub struct ScriptedEnrichment {
    name: String,
    quota_source: String,
    priority: u32,
    signals: Vec<(String, SignalValue)>,
    website: Option<String>,
    requires_website: bool,
    fail_for: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedEnrichment {
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            quota_source: name.to_string(),
            priority,
            signals: Vec::new(),
            website: None,
            requires_website: false,
            fail_for: HashSet::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_signal(mut self, key: &str, value: impl Into<SignalValue>) -> Self {
        self.signals.push((key.to_string(), value.into()));
        self
    }

    /// Website offered to every lead (fills empty or placeholder sites)
    pub fn with_website(mut self, website: &str) -> Self {
        self.website = Some(website.to_string());
        self
    }

    /// Only apply to leads with a real website
    pub fn requiring_website(mut self) -> Self {
        self.requires_website = true;
        self
    }

    /// Builder method to fail for the named lead
    pub fn failing_for(mut self, lead_name: &str) -> Self {
        self.fail_for.insert(lead_name.to_string());
        self
    }

    /// Names of the leads passed to `enrich`, in call order
    pub fn get_calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl EnrichmentAdapter for ScriptedEnrichment {
    fn name(&self) -> &str {
        &self.name
    }

    fn quota_source(&self) -> &str {
        &self.quota_source
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn applies_to(&self, lead: &Lead) -> bool {
        !self.requires_website || lead.real_website().is_some()
    }

    async fn enrich(&self, lead: &Lead) -> Result<Lead, AdapterError> {
        lock(&self.calls).push(lead.name.clone());
        if self.fail_for.contains(&lead.name) {
            return Err(AdapterError::Unavailable(format!(
                "{} scripted failure",
                self.name
            )));
        }

        let mut enriched = lead.clone();
        if let Some(ref website) = self.website {
            enriched.offer_website(website);
        }
        for (key, value) in &self.signals {
            enriched.set_signal(key, value.clone());
        }
        Ok(enriched)
    }
}

/// Event sink that keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        lock(&self.events).clone()
    }

    /// Number of recorded events with the given `PipelineEvent::name`
    pub fn count(&self, name: &str) -> usize {
        lock(&self.events).iter().filter(|e| e.name() == name).count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: PipelineEvent) {
        lock(&self.events).push(event);
    }
}

/// Exporter that keeps the last exported batch
#[derive(Debug, Default, Clone)]
pub struct RecordingExporter {
    exported: Arc<Mutex<Vec<Lead>>>,
}

impl RecordingExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exported(&self) -> Vec<Lead> {
        lock(&self.exported).clone()
    }
}

impl LeadExporter for RecordingExporter {
    fn export(&self, leads: &[Lead]) -> Result<ExportSummary, ExportError> {
        *lock(&self.exported) = leads.to_vec();
        Ok(ExportSummary {
            destination: "memory".to_string(),
            count: leads.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lead::signals;

    #[tokio::test]
    async fn test_scripted_discovery_pages() {
        let mock = ScriptedDiscovery::new("yelp", 1)
            .with_page_size(2)
            .with_leads(vec![
                PartialLead::new("A"),
                PartialLead::new("B"),
                PartialLead::new("C"),
            ]);

        let request = DiscoveryRequest::new("HVAC", "Milton, Ontario", 10);
        let first = mock.discover(&request).await.unwrap();
        let second = mock.discover(&request.page(10, 2)).await.unwrap();

        assert_eq!(first.leads.len(), 2);
        assert!(!first.exhausted);
        assert_eq!(second.leads.len(), 1);
        assert_eq!(second.leads[0].name, "C");
        assert!(second.exhausted);
        assert_eq!(mock.get_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_enrichment() {
        let mock = ScriptedEnrichment::new("website", 1)
            .with_signal(signals::HAS_BOOKING, true)
            .failing_for("Broken Co");

        let lead = Lead::from_partial(PartialLead::new("ABC"), "yelp");
        let enriched = mock.enrich(&lead).await.unwrap();
        assert_eq!(enriched.signal(signals::HAS_BOOKING), Some(&SignalValue::Bool(true)));
        assert!(lead.signal(signals::HAS_BOOKING).is_none());

        let broken = Lead::from_partial(PartialLead::new("Broken Co"), "yelp");
        assert!(mock.enrich(&broken).await.is_err());
        assert_eq!(mock.get_calls(), vec!["ABC".to_string(), "Broken Co".to_string()]);
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingEventSink::new();
        sink.emit(PipelineEvent::RunCancelled {
            phase: crate::ports::events::Phase::Discovery,
            leads: 0,
        });
        assert_eq!(sink.count("run_cancelled"), 1);
    }
}
