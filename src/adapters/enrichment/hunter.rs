//! Hunter.io domain search

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::adapters::http::{FetchClient, FetchRequest};
use crate::domain::lead::{signals, Lead};
use crate::ports::discovery::AdapterError;
use crate::ports::enrichment::EnrichmentAdapter;

pub const HUNTER_DOMAIN_SEARCH_URL: &str = "https://api.hunter.io/v2/domain-search";

/// Confidence assumed when Hunter omits one
const DEFAULT_CONFIDENCE: f64 = 50.0;

#[derive(Debug, Deserialize)]
struct DomainSearchResponse {
    data: Option<DomainData>,
    #[serde(default)]
    errors: Vec<HunterError>,
}

#[derive(Debug, Deserialize)]
struct DomainData {
    #[serde(default)]
    emails: Vec<HunterEmail>,
}

#[derive(Debug, Deserialize)]
struct HunterEmail {
    value: Option<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HunterError {
    #[serde(default)]
    details: String,
}

pub struct HunterEmailFinder {
    client: Arc<FetchClient>,
    api_key: String,
    api_url: String,
    priority: u32,
}

impl HunterEmailFinder {
    pub fn new(client: Arc<FetchClient>, api_key: impl Into<String>, priority: u32) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            api_url: HUNTER_DOMAIN_SEARCH_URL.to_string(),
            priority,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl EnrichmentAdapter for HunterEmailFinder {
    fn name(&self) -> &str {
        "hunter"
    }

    fn quota_source(&self) -> &str {
        "hunter"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn applies_to(&self, lead: &Lead) -> bool {
        lead.domain().is_some()
    }

    async fn enrich(&self, lead: &Lead) -> Result<Lead, AdapterError> {
        let domain = lead
            .domain()
            .ok_or_else(|| AdapterError::MissingInput(format!("'{}' has no domain", lead.name)))?;

        tracing::info!("Hunter: searching emails for {}", domain);
        let response = self
            .client
            .fetch(
                FetchRequest::get(&self.api_url)
                    .query("domain", &domain)
                    .query("api_key", &self.api_key),
            )
            .await?;

        let body: DomainSearchResponse = response.json()?;
        if !body.errors.is_empty() {
            let details: Vec<&str> = body.errors.iter().map(|e| e.details.as_str()).collect();
            return Err(AdapterError::Unavailable(format!("Hunter: {}", details.join("; "))));
        }

        let found: Vec<(String, f64)> = body
            .data
            .map(|d| d.emails)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|e| {
                let value = e.value?.trim().to_lowercase();
                (!value.is_empty()).then(|| (value, e.confidence.unwrap_or(DEFAULT_CONFIDENCE)))
            })
            .collect();

        let mut enriched = lead.clone();
        if found.is_empty() {
            tracing::debug!("Hunter: no emails for {}", domain);
            enriched.add_note(format!("Hunter: no emails found for {}", domain));
            return Ok(enriched);
        }

        let (primary, confidence) = found
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(email, confidence)| (email.clone(), *confidence))
            .unwrap_or_else(|| (found[0].0.clone(), DEFAULT_CONFIDENCE));

        tracing::info!(
            "Hunter: {} emails for {} (best {} at {}%)",
            found.len(),
            domain,
            primary,
            confidence
        );

        let emails: Vec<String> = found.into_iter().map(|(email, _)| email).collect();
        enriched.add_note(format!("Hunter: {} verified emails, primary {}", emails.len(), primary));
        enriched.set_signal(signals::EMAILS, emails);
        enriched.set_signal(signals::EMAILS_VERIFIED, true);
        enriched.set_signal(signals::EMAIL_CONFIDENCE, confidence);

        Ok(enriched)
    }
}
