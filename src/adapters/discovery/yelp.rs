//! Yelp Fusion business search

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::normalize_phone;
use crate::adapters::http::{FetchClient, FetchRequest};
use crate::domain::lead::{signals, PartialLead};
use crate::ports::discovery::{AdapterError, DiscoveryAdapter, DiscoveryPage, DiscoveryRequest};

pub const YELP_SEARCH_URL: &str = "https://api.yelp.com/v3/businesses/search";

/// Yelp caps `limit` at 50 per call
pub const YELP_PAGE_SIZE: usize = 50;

/// Yelp rejects `offset + limit` beyond this
pub const YELP_MAX_RESULTS: usize = 1000;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    businesses: Vec<Business>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct Business {
    name: Option<String>,
    url: Option<String>,
    phone: Option<String>,
    location: Option<Location>,
    rating: Option<f64>,
    review_count: Option<u32>,
    price: Option<String>,
    #[serde(default)]
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Location {
    city: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Category {
    title: String,
}

pub struct YelpFusionAdapter {
    client: Arc<FetchClient>,
    api_key: String,
    api_url: String,
    priority: u32,
}

impl YelpFusionAdapter {
    pub fn new(client: Arc<FetchClient>, api_key: impl Into<String>, priority: u32) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            api_url: YELP_SEARCH_URL.to_string(),
            priority,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl DiscoveryAdapter for YelpFusionAdapter {
    fn name(&self) -> &str {
        "yelp"
    }

    fn quota_source(&self) -> &str {
        "yelp"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn page_size(&self) -> usize {
        YELP_PAGE_SIZE
    }

    async fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryPage, AdapterError> {
        if request.location.trim().is_empty() {
            return Err(AdapterError::MissingInput("Yelp search needs a location".into()));
        }

        let limit = request
            .limit
            .min(YELP_PAGE_SIZE)
            .min(YELP_MAX_RESULTS.saturating_sub(request.offset));
        if limit == 0 {
            tracing::debug!("Yelp: result window ends at offset {}", request.offset);
            return Ok(DiscoveryPage::last(Vec::new()));
        }
        tracing::info!(
            "Yelp: searching '{}' in '{}' (max {}, offset {})",
            request.term,
            request.location,
            limit,
            request.offset
        );

        let response = self
            .client
            .fetch(
                FetchRequest::get(&self.api_url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Accept", "application/json")
                    .query("term", &request.term)
                    .query("location", &request.location)
                    .query("limit", limit)
                    .query("offset", request.offset)
                    .query("sort_by", "best_match"),
            )
            .await?;

        let body: SearchResponse = response.json()?;
        let fetched = body.businesses.len();
        tracing::info!(
            "Yelp: {} businesses (total available: {})",
            fetched,
            body.total
        );

        let seen = (request.offset + fetched) as u64;
        let exhausted = fetched < limit
            || seen >= body.total
            || request.offset + fetched >= YELP_MAX_RESULTS;
        let leads = body
            .businesses
            .into_iter()
            .filter_map(|business| map_business(business, &request.term))
            .take(limit)
            .collect();
        Ok(DiscoveryPage::new(leads, fetched, exhausted))
    }
}

fn map_business(business: Business, term: &str) -> Option<PartialLead> {
    let name = business.name.filter(|n| !n.trim().is_empty())?;
    let mut lead = PartialLead::new(name);

    if let Some(location) = business.location {
        lead.city = location.city.filter(|c| !c.is_empty());
        lead.region = location.state.filter(|s| !s.is_empty());
    }
    lead.phone = business.phone.as_deref().and_then(normalize_phone);
    // The listing URL stands in for a website until enrichment finds the real one
    lead.website = business.url.clone();
    lead.source_url = business.url;

    if let Some(rating) = business.rating {
        lead.signals.insert(signals::RATING.to_string(), rating.into());
    }
    if let Some(count) = business.review_count {
        lead.signals.insert(signals::REVIEW_COUNT.to_string(), count.into());
    }
    if let Some(price) = business.price.filter(|p| !p.is_empty()) {
        lead.signals.insert(signals::PRICE_LEVEL.to_string(), price.into());
    }
    let categories: Vec<String> = business.categories.into_iter().map(|c| c.title).collect();
    if !categories.is_empty() {
        lead.signals.insert(signals::CATEGORIES.to_string(), categories.into());
    }
    lead.notes.push(format!("Yelp search: '{}'", term));

    Some(lead)
}
