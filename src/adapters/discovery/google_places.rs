//! Google Places text search
//!
//! One text-search call per query; the endpoint has no offset, so the first
//! page is also the last. Text search carries no website or phone; those
//! come from a Places Details lookup keyed by `place_id` during enrichment.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::adapters::http::{FetchClient, FetchRequest};
use crate::domain::lead::{signals, PartialLead};
use crate::ports::discovery::{AdapterError, DiscoveryAdapter, DiscoveryPage, DiscoveryRequest};

pub const GOOGLE_PLACES_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";

/// Results per text-search page
pub const GOOGLE_PAGE_SIZE: usize = 20;

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: Option<String>,
    place_id: Option<String>,
    formatted_address: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
    price_level: Option<u32>,
    #[serde(default)]
    types: Vec<String>,
}

pub struct GooglePlacesAdapter {
    client: Arc<FetchClient>,
    api_key: String,
    api_url: String,
    priority: u32,
}

impl GooglePlacesAdapter {
    pub fn new(client: Arc<FetchClient>, api_key: impl Into<String>, priority: u32) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            api_url: GOOGLE_PLACES_URL.to_string(),
            priority,
        }
    }

    /// Override the endpoint (proxies, tests)
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl DiscoveryAdapter for GooglePlacesAdapter {
    fn name(&self) -> &str {
        "google_places"
    }

    fn quota_source(&self) -> &str {
        "google_places"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn page_size(&self) -> usize {
        GOOGLE_PAGE_SIZE
    }

    async fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryPage, AdapterError> {
        if request.offset > 0 {
            tracing::debug!("Google Places has no further pages (offset {})", request.offset);
            return Ok(DiscoveryPage::last(Vec::new()));
        }

        let query = if request.location.trim().is_empty() {
            request.term.clone()
        } else {
            format!("{} in {}", request.term, request.location)
        };

        tracing::info!("Google Places: searching '{}' (max {})", query, request.limit);

        let response = self
            .client
            .fetch(
                FetchRequest::get(&self.api_url)
                    .query("query", &query)
                    .query("key", &self.api_key),
            )
            .await?;

        let body: TextSearchResponse = response.json()?;
        match body.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            other => {
                return Err(AdapterError::Unavailable(format!(
                    "Google Places status {}: {}",
                    other,
                    body.error_message.unwrap_or_default()
                )))
            }
        }

        let limit = request.limit.min(GOOGLE_PAGE_SIZE);
        let fetched = body.results.len();
        let leads: Vec<PartialLead> = body
            .results
            .into_iter()
            .filter_map(|place| map_place(place, &request.term))
            .take(limit)
            .collect();

        tracing::info!("Google Places: {} businesses from {} places", leads.len(), fetched);
        Ok(DiscoveryPage::new(leads, fetched, true))
    }
}

/// City and region from "street, city, REGION postal, country"
fn split_address(address: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = address.split(", ").collect();
    if parts.len() < 3 {
        return (None, None);
    }
    let city = parts[parts.len() - 3].trim();
    let region = parts[parts.len() - 2].split_whitespace().next();
    (
        Some(city.to_string()).filter(|c| !c.is_empty()),
        region.map(str::to_string),
    )
}

fn map_place(place: Place, term: &str) -> Option<PartialLead> {
    let name = place.name.filter(|n| !n.trim().is_empty())?;
    let mut lead = PartialLead::new(name);

    if let Some(address) = place.formatted_address.as_deref() {
        let (city, region) = split_address(address);
        lead.city = city;
        lead.region = region;
    }
    let place_id = place.place_id.filter(|id| !id.trim().is_empty());
    lead.source_url = place_id
        .as_deref()
        .map(|id| format!("https://www.google.com/maps/place/?q=place_id:{}", id));
    lead.place_id = place_id;

    if let Some(rating) = place.rating {
        lead.signals.insert(signals::RATING.to_string(), rating.into());
    }
    if let Some(count) = place.user_ratings_total {
        lead.signals.insert(signals::REVIEW_COUNT.to_string(), count.into());
    }
    if let Some(level) = place.price_level {
        lead.signals.insert(signals::PRICE_LEVEL.to_string(), level.into());
    }
    if !place.types.is_empty() {
        lead.signals.insert(signals::CATEGORIES.to_string(), place.types.into());
    }
    lead.notes.push(format!("Google Places search: '{}'", term));

    Some(lead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::{FetchConfig, ScriptedTransport};
    use crate::domain::lead::SignalValue;
    use std::time::Duration;

    const FIXTURE: &str = r#"{
        "status": "OK",
        "results": [
            {
                "name": "Milton Heating & Cooling",
                "place_id": "ChIJ123",
                "formatted_address": "123 Main St E, Milton, ON L9T 1N4, Canada",
                "rating": 4.7,
                "user_ratings_total": 212,
                "types": ["hvac_contractor", "point_of_interest"]
            },
            { "name": "", "place_id": "skip-me" },
            {
                "name": "Halton Air",
                "place_id": "ChIJ456",
                "formatted_address": "Milton"
            }
        ]
    }"#;

    fn adapter(transport: Arc<ScriptedTransport>) -> GooglePlacesAdapter {
        let config = FetchConfig {
            min_interval: Duration::from_millis(1),
            backoff_base: Duration::from_millis(1),
            ..FetchConfig::default()
        };
        let client = Arc::new(FetchClient::with_transport(config, transport));
        GooglePlacesAdapter::new(client, "test-key", 2)
    }

    #[tokio::test]
    async fn test_maps_text_search_results() {
        let transport = Arc::new(ScriptedTransport::default().route("textsearch", 200, FIXTURE));
        let page = adapter(transport.clone())
            .discover(&DiscoveryRequest::new("HVAC", "Milton, Ontario", 10))
            .await
            .unwrap();

        assert!(page.exhausted);
        assert_eq!(page.fetched, 3);
        let leads = page.leads;
        assert_eq!(leads.len(), 2);
        let first = &leads[0];
        assert_eq!(first.name, "Milton Heating & Cooling");
        assert_eq!(first.city.as_deref(), Some("Milton"));
        assert_eq!(first.region.as_deref(), Some("ON"));
        assert_eq!(first.place_id.as_deref(), Some("ChIJ123"));
        assert!(first.phone.is_none());
        assert!(first.website.is_none());
        assert_eq!(
            first.source_url.as_deref(),
            Some("https://www.google.com/maps/place/?q=place_id:ChIJ123")
        );
        assert_eq!(first.signals.get(signals::REVIEW_COUNT), Some(&SignalValue::Number(212.0)));
        assert!(leads[1].city.is_none());

        let sent = &transport.requests()[0];
        assert!(sent.url.contains("query=HVAC+in+Milton%2C+Ontario"));
        assert!(sent.url.contains("key=test-key"));
    }

    #[tokio::test]
    async fn test_truncates_to_requested_limit() {
        let transport = Arc::new(ScriptedTransport::default().route("textsearch", 200, FIXTURE));
        let page = adapter(transport)
            .discover(&DiscoveryRequest::new("HVAC", "Milton", 1))
            .await
            .unwrap();
        assert_eq!(page.leads.len(), 1);
    }

    #[tokio::test]
    async fn test_later_pages_are_empty_without_network() {
        let transport = Arc::new(ScriptedTransport::default());
        let page = DiscoveryRequest::new("HVAC", "Milton", 10).page(10, 20);
        let found = adapter(transport.clone()).discover(&page).await.unwrap();
        assert!(found.leads.is_empty());
        assert!(found.exhausted);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_denied_status_is_unavailable() {
        let body = r#"{"status": "REQUEST_DENIED", "error_message": "API key invalid"}"#;
        let transport = Arc::new(ScriptedTransport::default().route("textsearch", 200, body));
        let err = adapter(transport)
            .discover(&DiscoveryRequest::new("HVAC", "Milton", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unavailable(ref m) if m.contains("REQUEST_DENIED")));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let transport = Arc::new(ScriptedTransport::default().route("textsearch", 200, "<html>"));
        let err = adapter(transport)
            .discover(&DiscoveryRequest::new("HVAC", "Milton", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::MalformedResponse(_)));
    }
}
