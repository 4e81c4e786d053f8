//! Website Discovery
//!
//! Finds the business's own website for leads that only have a directory
//! listing. A Google Places Details lookup answers first when the lead
//! carries a `place_id`; a Tavily web search is the fallback. Each backend
//! call is reserved against that provider's own quota before it is made.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use super::tavily::{self, find_business_website, SearchRequest, TAVILY_SEARCH_URL};
use crate::adapters::discovery::normalize_phone;
use crate::adapters::http::{FetchClient, FetchRequest};
use crate::domain::lead::{is_placeholder_website, Lead};
use crate::domain::quota::QuotaLedger;
use crate::ports::discovery::AdapterError;
use crate::ports::enrichment::EnrichmentAdapter;

pub const PLACES_DETAILS_URL: &str = "https://maps.googleapis.com/maps/api/place/details/json";

/// Details fields billed per lookup; keep this list short
const DETAILS_FIELDS: &str = "website,formatted_phone_number";

const PLACES_QUOTA: &str = "google_places";
const SEARCH_QUOTA: &str = "tavily";

const SEARCH_RESULTS: usize = 5;
const SEARCH_EXCLUDE: &[&str] = &["yelp.com", "facebook.com", "yellowpages.com", "instagram.com"];

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    result: Option<PlaceDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaceDetails {
    website: Option<String>,
    formatted_phone_number: Option<String>,
}

/// Backend that produced a website
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebsiteOrigin {
    PlacesDetails,
    WebSearch,
}

impl fmt::Display for WebsiteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebsiteOrigin::PlacesDetails => write!(f, "Google Places Details"),
            WebsiteOrigin::WebSearch => write!(f, "Tavily search"),
        }
    }
}

#[derive(Debug, Clone)]
struct Backend {
    api_key: String,
    api_url: String,
}

pub struct WebsiteFinder {
    client: Arc<FetchClient>,
    ledger: Arc<QuotaLedger>,
    priority: u32,
    places: Option<Backend>,
    search: Option<Backend>,
}

impl WebsiteFinder {
    pub fn new(client: Arc<FetchClient>, ledger: Arc<QuotaLedger>, priority: u32) -> Self {
        Self {
            client,
            ledger,
            priority,
            places: None,
            search: None,
        }
    }

    /// Enable Places Details lookups for leads with a `place_id`
    pub fn with_places(mut self, api_key: impl Into<String>) -> Self {
        self.places = Some(Backend {
            api_key: api_key.into(),
            api_url: PLACES_DETAILS_URL.to_string(),
        });
        self
    }

    pub fn with_places_url(mut self, url: impl Into<String>) -> Self {
        if let Some(backend) = self.places.as_mut() {
            backend.api_url = url.into();
        }
        self
    }

    /// Enable the web-search fallback
    pub fn with_search(mut self, api_key: impl Into<String>) -> Self {
        self.search = Some(Backend {
            api_key: api_key.into(),
            api_url: TAVILY_SEARCH_URL.to_string(),
        });
        self
    }

    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        if let Some(backend) = self.search.as_mut() {
            backend.api_url = url.into();
        }
        self
    }

    async fn place_details(
        &self,
        backend: &Backend,
        place_id: &str,
    ) -> Result<PlaceDetails, AdapterError> {
        let response = self
            .client
            .fetch(
                FetchRequest::get(&backend.api_url)
                    .query("place_id", place_id)
                    .query("fields", DETAILS_FIELDS)
                    .query("key", &backend.api_key),
            )
            .await?;

        let body: DetailsResponse = response.json()?;
        match body.status.as_str() {
            "OK" => Ok(body.result.unwrap_or_default()),
            "ZERO_RESULTS" | "NOT_FOUND" => Ok(PlaceDetails::default()),
            other => Err(AdapterError::Unavailable(format!(
                "Places Details status {}: {}",
                other,
                body.error_message.unwrap_or_default()
            ))),
        }
    }

    async fn search_website(&self, backend: &Backend, lead: &Lead) -> Result<Option<String>, AdapterError> {
        let city = lead.city.as_deref().unwrap_or_default();
        let request = SearchRequest {
            api_key: &backend.api_key,
            query: format!("\"{}\" {} website", lead.name, city),
            search_depth: "basic",
            max_results: SEARCH_RESULTS,
            include_domains: &[],
            exclude_domains: SEARCH_EXCLUDE,
            time_range: None,
            include_raw_content: false,
            include_answer: false,
        };
        let results = tavily::search(&self.client, &backend.api_url, &request).await?;
        Ok(find_business_website(&results, &lead.name))
    }
}

#[async_trait]
impl EnrichmentAdapter for WebsiteFinder {
    fn name(&self) -> &str {
        "website_discovery"
    }

    /// Counts lookups; backend calls are charged to their providers
    fn quota_source(&self) -> &str {
        "website_discovery"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn applies_to(&self, lead: &Lead) -> bool {
        lead.real_website().is_none()
            && ((self.places.is_some() && lead.place_id.is_some()) || self.search.is_some())
    }

    async fn enrich(&self, lead: &Lead) -> Result<Lead, AdapterError> {
        let mut enriched = lead.clone();
        let mut found: Option<(String, WebsiteOrigin)> = None;
        let mut attempted = 0usize;
        let mut failures = 0usize;
        let mut last_error: Option<AdapterError> = None;

        if let (Some(places), Some(place_id)) = (self.places.as_ref(), lead.place_id.as_deref()) {
            if self.ledger.reserve(PLACES_QUOTA) {
                attempted += 1;
                tracing::info!("Website discovery: Places Details for {}", lead.name);
                match self.place_details(places, place_id).await {
                    Ok(details) => {
                        if enriched.phone.is_none() {
                            enriched.phone =
                                details.formatted_phone_number.as_deref().and_then(normalize_phone);
                        }
                        found = details
                            .website
                            .filter(|w| !w.trim().is_empty() && !is_placeholder_website(w))
                            .map(|w| (w, WebsiteOrigin::PlacesDetails));
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        tracing::debug!("Places Details failed for {}: {}", lead.name, e);
                        enriched.add_note(format!("Places Details lookup failed: {}", e));
                        failures += 1;
                        last_error = Some(e);
                    }
                }
            } else {
                enriched.add_note(format!("Places Details skipped: {} quota exhausted", PLACES_QUOTA));
            }
        }

        if found.is_none() {
            if let Some(search) = self.search.as_ref() {
                if self.ledger.reserve(SEARCH_QUOTA) {
                    attempted += 1;
                    tracing::info!("Website discovery: web search for {}", lead.name);
                    match self.search_website(search, lead).await {
                        Ok(site) => found = site.map(|s| (s, WebsiteOrigin::WebSearch)),
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => {
                            tracing::debug!("Website search failed for {}: {}", lead.name, e);
                            enriched.add_note(format!("Website search failed: {}", e));
                            failures += 1;
                            last_error = Some(e);
                        }
                    }
                } else {
                    enriched.add_note(format!("Website search skipped: {} quota exhausted", SEARCH_QUOTA));
                }
            }
        }

        match found {
            Some((site, origin)) => {
                if enriched.offer_website(&site) {
                    tracing::info!("Website discovery: {} -> {} (via {})", lead.name, site, origin);
                    enriched.add_note(format!("Website discovered via {}", origin));
                }
            }
            None => {
                // Every backend tried failed outright
                if attempted > 0 && failures == attempted {
                    if let Some(error) = last_error {
                        return Err(error);
                    }
                }
                enriched.add_note("Website discovery: no business website found");
            }
        }

        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::{FetchConfig, ScriptedTransport};
    use crate::adapters::storage::MemoryQuotaStore;
    use crate::domain::lead::PartialLead;
    use crate::domain::quota::{QuotaLimit, QuotaPeriod};
    use std::time::Duration;

    const DETAILS: &str = r#"{
        "status": "OK",
        "result": {
            "website": "https://miltonheating.ca/",
            "formatted_phone_number": "(905) 555-0199"
        }
    }"#;

    const SEARCH: &str = r#"{
        "results": [
            { "url": "https://www.yelp.com/biz/halton-air-milton", "title": "Halton Air", "content": "" },
            { "url": "https://haltonair.com/contact", "title": "Halton Air | Contact", "content": "" }
        ]
    }"#;

    fn ledger(google_cap: Option<u64>) -> Arc<QuotaLedger> {
        let limits = vec![
            QuotaLimit::new("website_discovery", QuotaPeriod::Daily, None),
            QuotaLimit::new("google_places", QuotaPeriod::Monthly, google_cap),
            QuotaLimit::new("tavily", QuotaPeriod::Monthly, Some(100)),
        ];
        Arc::new(QuotaLedger::open(Arc::new(MemoryQuotaStore::new()), &limits).unwrap())
    }

    fn finder(transport: Arc<ScriptedTransport>, ledger: Arc<QuotaLedger>) -> WebsiteFinder {
        let config = FetchConfig {
            min_interval: Duration::from_millis(1),
            backoff_base: Duration::from_millis(1),
            max_attempts: 1,
            ..FetchConfig::default()
        };
        WebsiteFinder::new(Arc::new(FetchClient::with_transport(config, transport)), ledger, 0)
            .with_places("google-key")
            .with_search("tvly-key")
    }

    fn google_lead(name: &str, place_id: &str) -> Lead {
        Lead::from_partial(
            PartialLead::new(name).with_location("Milton", "ON").with_place_id(place_id),
            "google_places",
        )
    }

    #[tokio::test]
    async fn test_places_details_fills_website_and_phone() {
        let transport = Arc::new(ScriptedTransport::default().route("place/details", 200, DETAILS));
        let ledger = ledger(Some(10));
        let lead = google_lead("Milton Heating", "ChIJ123");

        let enriched = finder(transport.clone(), ledger.clone()).enrich(&lead).await.unwrap();

        assert_eq!(enriched.website.as_deref(), Some("https://miltonheating.ca/"));
        assert_eq!(enriched.phone.as_deref(), Some("+1-905-555-0199"));
        assert!(enriched.notes.contains(&"Website discovered via Google Places Details".to_string()));

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].url.contains("place_id=ChIJ123"));
        assert!(sent[0].url.contains("fields=website%2Cformatted_phone_number"));
        assert_eq!(ledger.status("google_places").unwrap().used, 1);
        assert_eq!(ledger.status("tavily").unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_search_fallback_without_place_id() {
        let transport = Arc::new(ScriptedTransport::default().route("api.tavily.com", 200, SEARCH));
        let ledger = ledger(Some(10));
        let lead = Lead::from_partial(
            PartialLead::new("Halton Air")
                .with_location("Milton", "ON")
                .with_website("https://www.yelp.com/biz/halton-air-milton"),
            "yelp",
        );

        let enriched = finder(transport.clone(), ledger.clone()).enrich(&lead).await.unwrap();

        assert_eq!(enriched.website.as_deref(), Some("https://haltonair.com/contact"));
        assert_eq!(ledger.status("google_places").unwrap().used, 0);
        assert_eq!(ledger.status("tavily").unwrap().used, 1);
        let payload = transport.requests()[0].body.clone().unwrap();
        assert_eq!(payload["query"], "\"Halton Air\" Milton website");
        assert!(payload.get("time_range").is_none());
    }

    #[tokio::test]
    async fn test_exhausted_places_quota_falls_back_to_search() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .route("place/details", 200, DETAILS)
                .route("api.tavily.com", 200, SEARCH),
        );
        let lead = google_lead("Halton Air", "ChIJ456");

        let enriched = finder(transport.clone(), ledger(Some(0))).enrich(&lead).await.unwrap();

        assert_eq!(enriched.website.as_deref(), Some("https://haltonair.com/contact"));
        assert!(enriched
            .notes
            .contains(&"Places Details skipped: google_places quota exhausted".to_string()));
        assert!(transport.requests().iter().all(|r| !r.url.contains("place/details")));
    }

    #[tokio::test]
    async fn test_nothing_found_leaves_a_note() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .route("place/details", 200, r#"{"status": "OK", "result": {}}"#)
                .route("api.tavily.com", 200, r#"{"results": []}"#),
        );
        let lead = google_lead("Quiet Co", "ChIJ789");

        let enriched = finder(transport, ledger(None)).enrich(&lead).await.unwrap();

        assert!(enriched.real_website().is_none());
        assert_eq!(
            enriched.notes.last().map(String::as_str),
            Some("Website discovery: no business website found")
        );
    }

    #[tokio::test]
    async fn test_all_backends_failing_is_an_error() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .route("place/details", 200, r#"{"status": "REQUEST_DENIED"}"#)
                .route("api.tavily.com", 401, ""),
        );
        let lead = google_lead("Milton Heating", "ChIJ123");

        let err = finder(transport, ledger(None)).enrich(&lead).await.unwrap_err();
        assert!(matches!(err, AdapterError::Fetch(_)));
    }

    #[test]
    fn test_applies_only_without_a_real_website() {
        let transport = Arc::new(ScriptedTransport::default());
        let config = FetchConfig::default();
        let client = Arc::new(FetchClient::with_transport(config, transport));
        let places_only = WebsiteFinder::new(client, ledger(None), 0).with_places("google-key");

        assert!(places_only.applies_to(&google_lead("Milton Heating", "ChIJ123")));

        let listed = Lead::from_partial(
            PartialLead::new("Halton Air").with_website("https://www.yelp.com/biz/halton-air"),
            "yelp",
        );
        assert!(!places_only.applies_to(&listed));

        let with_site = Lead::from_partial(
            PartialLead::new("ABC Heating")
                .with_place_id("ChIJ1")
                .with_website("https://abcheating.ca"),
            "google_places",
        );
        assert!(!places_only.applies_to(&with_site));
    }
}
