//! Tavily web research
//!
//! Searches the open web for mentions of a lead to judge reputation,
//! recent activity and, when discovery only had a listing URL, the
//! business's real website.

use async_trait::async_trait;
use chrono::Datelike;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::http::{FetchClient, FetchRequest};
use crate::domain::lead::{is_placeholder_website, signals, Lead};
use crate::ports::discovery::AdapterError;
use crate::ports::enrichment::EnrichmentAdapter;

pub const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RESULTS: usize = 10;
const NEUTRAL_REPUTATION: i64 = 50;

const INCLUDE_DOMAINS: &[&str] = &[
    "google.com/maps",
    "facebook.com",
    "linkedin.com",
    "yellowpages.com",
    "bbb.org",
    "trustpilot.com",
];
const EXCLUDE_DOMAINS: &[&str] = &["yelp.com", "instagram.com", "twitter.com"];

const POSITIVE_KEYWORDS: &[&str] = &[
    "excellent", "great", "best", "professional", "reliable", "recommend", "quality", "trusted",
    "amazing", "fantastic", "wonderful",
];
const NEGATIVE_KEYWORDS: &[&str] = &[
    "scam", "fraud", "avoid", "terrible", "worst", "nightmare", "lawsuit", "complaint", "warning",
    "unprofessional", "dishonest", "ripoff",
];

const REVIEW_SITES: &[(&str, &str)] = &[
    ("google.com/maps", "Google Maps"),
    ("facebook.com", "Facebook"),
    ("bbb.org", "BBB"),
    ("trustpilot.com", "Trustpilot"),
];

#[derive(Debug, Serialize)]
pub(crate) struct SearchRequest<'a> {
    pub api_key: &'a str,
    pub query: String,
    pub search_depth: &'a str,
    pub max_results: usize,
    pub include_domains: &'a [&'a str],
    pub exclude_domains: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<&'a str>,
    pub include_raw_content: bool,
    pub include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// What the search results say about a business
#[derive(Debug, Clone, PartialEq)]
pub struct Research {
    pub verified_website: Option<String>,
    pub recent_activity: bool,
    pub reputation_score: u32,
    pub sources_found: usize,
    pub review_sites: Vec<String>,
    pub negative_flags: Vec<String>,
}

fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// First non-directory result whose host contains the business name
pub fn find_business_website(results: &[SearchResult], business_name: &str) -> Option<String> {
    let name_key = compact(business_name);
    if name_key.is_empty() {
        return None;
    }
    results
        .iter()
        .filter(|r| !is_placeholder_website(&r.url))
        .find(|r| {
            Url::parse(&r.url)
                .ok()
                .and_then(|u| u.host_str().map(compact))
                .is_some_and(|host| host.contains(&name_key))
        })
        .map(|r| r.url.clone())
}

/// POST one search and return its results
pub(crate) async fn search(
    client: &FetchClient,
    api_url: &str,
    request: &SearchRequest<'_>,
) -> Result<Vec<SearchResult>, AdapterError> {
    let body = serde_json::to_value(request)?;
    let response = client
        .fetch(FetchRequest::post_json(api_url, body).timeout(SEARCH_TIMEOUT))
        .await?;
    let parsed: SearchResponse = response.json()?;
    Ok(parsed.results)
}

/// Score search results for one business.
///
/// Reputation starts neutral at 50, gains 5 per positive keyword (up to 30),
/// loses 10 per negative keyword (up to 50) and gains 10 for a BBB or
/// Trustpilot presence.
pub fn analyze_results(
    results: &[SearchResult],
    business_name: &str,
    known_website: Option<&str>,
    reference_year: i32,
) -> Research {
    let years = [reference_year.to_string(), (reference_year - 1).to_string()];

    let mut recent = 0usize;
    let mut positive = 0i64;
    let mut negative = 0i64;
    let mut review_sites: Vec<String> = Vec::new();
    let mut negative_flags = Vec::new();

    for result in results {
        let url_lower = result.url.to_lowercase();
        let text = format!("{} {}", result.title, result.content).to_lowercase();

        if years.iter().any(|y| result.content.contains(y.as_str())) {
            recent += 1;
        }

        if let Some((_, site)) = REVIEW_SITES.iter().find(|(host, _)| url_lower.contains(host)) {
            if !review_sites.iter().any(|s| s == site) {
                review_sites.push(site.to_string());
            }
        }

        positive += POSITIVE_KEYWORDS.iter().filter(|k| text.contains(*k)).count() as i64;
        for keyword in NEGATIVE_KEYWORDS.iter().filter(|k| text.contains(*k)) {
            negative += 1;
            negative_flags.push(format!("Found '{}' in {}", keyword, result.url));
        }
    }

    let mut score = NEUTRAL_REPUTATION + (positive * 5).min(30) - (negative * 10).min(50);
    if review_sites.iter().any(|s| s == "BBB" || s == "Trustpilot") {
        score += 10;
    }

    let verified_website = find_business_website(results, business_name).or_else(|| {
        known_website
            .filter(|w| !is_placeholder_website(w))
            .map(str::to_string)
    });

    Research {
        verified_website,
        recent_activity: recent >= 2,
        reputation_score: score.clamp(0, 100) as u32,
        sources_found: results.len(),
        review_sites,
        negative_flags,
    }
}

pub struct TavilyResearcher {
    client: Arc<FetchClient>,
    api_key: String,
    api_url: String,
    priority: u32,
    reference_year: i32,
}

impl TavilyResearcher {
    pub fn new(client: Arc<FetchClient>, api_key: impl Into<String>, priority: u32) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            api_url: TAVILY_SEARCH_URL.to_string(),
            priority,
            reference_year: chrono::Utc::now().year(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Year that, with the one before it, counts as recent activity
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }
}

#[async_trait]
impl EnrichmentAdapter for TavilyResearcher {
    fn name(&self) -> &str {
        "tavily"
    }

    fn quota_source(&self) -> &str {
        "tavily"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn enrich(&self, lead: &Lead) -> Result<Lead, AdapterError> {
        let city = lead.city.as_deref().unwrap_or_default();
        let request = SearchRequest {
            api_key: &self.api_key,
            query: format!("\"{}\" {} reviews contact website", lead.name, city),
            search_depth: "advanced",
            max_results: MAX_RESULTS,
            include_domains: INCLUDE_DOMAINS,
            exclude_domains: EXCLUDE_DOMAINS,
            time_range: Some("year"),
            include_raw_content: false,
            include_answer: false,
        };

        tracing::info!("Tavily: researching '{}' in {}", lead.name, city);
        tracing::debug!("Tavily query: {}", request.query);

        let results = search(&self.client, &self.api_url, &request).await?;

        let mut enriched = lead.clone();
        if results.is_empty() {
            tracing::info!("Tavily: no results for {}", lead.name);
            enriched.add_note("Tavily: no web mentions found");
            enriched.set_signal(signals::SOURCES_FOUND, 0u32);
            return Ok(enriched);
        }

        let research = analyze_results(
            &results,
            &lead.name,
            lead.website.as_deref(),
            self.reference_year,
        );
        tracing::info!(
            "Tavily: {} sources for {}, reputation {}/100",
            research.sources_found,
            lead.name,
            research.reputation_score
        );

        if let Some(site) = research.verified_website.as_deref() {
            if enriched.offer_website(site) {
                tracing::info!("Tavily: website for {} is {}", lead.name, site);
            }
        }
        enriched.set_signal(signals::RECENT_ACTIVITY, research.recent_activity);
        enriched.set_signal(signals::REPUTATION_SCORE, research.reputation_score);
        enriched.set_signal(signals::SOURCES_FOUND, research.sources_found as u32);
        enriched.set_signal(signals::REVIEW_SITES, research.review_sites);
        enriched.set_signal(signals::NEGATIVE_FLAGS, research.negative_flags);

        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::{FetchConfig, HttpMethod, ScriptedTransport};
    use crate::domain::lead::{PartialLead, SignalValue};

    fn result(url: &str, title: &str, content: &str) -> SearchResult {
        SearchResult {
            url: url.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    fn researcher(transport: Arc<ScriptedTransport>) -> TavilyResearcher {
        let config = FetchConfig {
            min_interval: Duration::from_millis(1),
            backoff_base: Duration::from_millis(1),
            ..FetchConfig::default()
        };
        TavilyResearcher::new(Arc::new(FetchClient::with_transport(config, transport)), "tvly-key", 3)
            .with_reference_year(2026)
    }

    #[test]
    fn test_reputation_scoring() {
        let results = vec![
            result("https://www.bbb.org/ca/on/milton/abc", "ABC Heating", "Trusted and reliable since 2026"),
            result("https://facebook.com/abcheating", "ABC", "Great service in 2025"),
            result("https://forum.example.org/t/1", "Avoid", "a nightmare"),
        ];
        let research = analyze_results(&results, "ABC Heating", None, 2026);

        // 3 positive (+15), 2 negative (-20), BBB (+10)
        assert_eq!(research.reputation_score, 55);
        assert!(research.recent_activity);
        assert_eq!(research.sources_found, 3);
        assert_eq!(research.review_sites, vec!["BBB", "Facebook"]);
        assert_eq!(
            research.negative_flags,
            vec![
                "Found 'avoid' in https://forum.example.org/t/1",
                "Found 'nightmare' in https://forum.example.org/t/1"
            ]
        );
    }

    #[test]
    fn test_reputation_is_clamped() {
        let results: Vec<SearchResult> = (0..6)
            .map(|i| result(&format!("https://r{}.org", i), "scam fraud", "worst ripoff lawsuit"))
            .collect();
        assert_eq!(analyze_results(&results, "X", None, 2026).reputation_score, 0);
    }

    #[test]
    fn test_finds_business_website() {
        let results = vec![
            result("https://www.facebook.com/abcheating", "", ""),
            result("https://abcheating.ca/about", "", ""),
        ];
        let research = analyze_results(&results, "ABC Heating", Some("https://www.yelp.com/biz/abc"), 2026);
        assert_eq!(research.verified_website.as_deref(), Some("https://abcheating.ca/about"));

        let research = analyze_results(&results[..1], "ABC Heating", Some("https://www.yelp.com/biz/abc"), 2026);
        assert!(research.verified_website.is_none());
    }

    #[test]
    fn test_single_recent_mention_is_not_activity() {
        let results = vec![result("https://a.org", "", "posted 2026"), result("https://b.org", "", "2019")];
        assert!(!analyze_results(&results, "X", None, 2026).recent_activity);
    }

    #[tokio::test]
    async fn test_enrich_posts_search_and_upgrades_website() {
        let body = r#"{
            "query": "q",
            "results": [
                { "url": "https://abcheating.ca", "title": "ABC Heating", "content": "Excellent, recommend. 2026" },
                { "url": "https://www.trustpilot.com/review/abcheating.ca", "title": "Reviews", "content": "2025 quality" }
            ]
        }"#;
        let transport = Arc::new(ScriptedTransport::default().route("api.tavily.com", 200, body));
        let lead = Lead::from_partial(
            PartialLead::new("ABC Heating")
                .with_location("Milton", "ON")
                .with_website("https://www.yelp.com/biz/abc-heating"),
            "yelp",
        );

        let enriched = researcher(transport.clone()).enrich(&lead).await.unwrap();
        assert_eq!(enriched.website.as_deref(), Some("https://abcheating.ca"));
        assert_eq!(enriched.signal(signals::RECENT_ACTIVITY), Some(&SignalValue::Bool(true)));
        // 3 positive (+15) and Trustpilot (+10)
        assert_eq!(enriched.signal(signals::REPUTATION_SCORE), Some(&SignalValue::Number(75.0)));

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, HttpMethod::Post);
        let payload = sent.body.as_ref().unwrap();
        assert_eq!(payload["query"], "\"ABC Heating\" Milton reviews contact website");
        assert_eq!(payload["search_depth"], "advanced");
        assert_eq!(payload["exclude_domains"][0], "yelp.com");
    }

    #[tokio::test]
    async fn test_no_results_leaves_a_note() {
        let transport = Arc::new(ScriptedTransport::default().route("api.tavily.com", 200, r#"{"results": []}"#));
        let lead = Lead::from_partial(PartialLead::new("Quiet Co"), "yelp");
        let enriched = researcher(transport).enrich(&lead).await.unwrap();
        assert_eq!(enriched.notes, vec!["Tavily: no web mentions found"]);
        assert!(enriched.signal(signals::REPUTATION_SCORE).is_none());
    }
}
