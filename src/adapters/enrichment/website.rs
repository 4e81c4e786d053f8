//! Website Scraper
//!
//! Fetches a lead's homepage (and its contact page when one is linked) and
//! extracts contact and business-feature signals. Parsing happens in plain
//! functions so the HTML tree never lives across an await.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use std::sync::Arc;

use crate::adapters::http::{FetchClient, FetchError};
use crate::domain::lead::{signals, Lead};
use crate::ports::discovery::AdapterError;
use crate::ports::enrichment::EnrichmentAdapter;

const BOOKING_KEYWORDS: &[&str] = &["booking", "appointment", "schedule", "book now", "reserve"];
const EMERGENCY_KEYWORDS: &[&str] = &["emergency", "24/7", "24 hour", "urgent", "same day"];
const FINANCING_KEYWORDS: &[&str] = &["financing", "payment plan", "credit", "installment"];
const CONTACT_KEYWORDS: &[&str] = &["contact", "get-in-touch", "reach-us"];
const FORM_FIELD_KEYWORDS: &[&str] = &["email", "message", "contact", "inquiry"];

const TECH_PATTERNS: &[(&str, &[&str])] = &[
    ("WordPress", &["wp-content", "wp-includes", "wordpress"]),
    ("Wix", &["wix.com", "wixstatic"]),
    ("Squarespace", &["squarespace", "sqsp"]),
    ("Shopify", &["shopify", "cdn.shopify"]),
    ("Webflow", &["webflow"]),
];

const IGNORED_EMAIL_DOMAINS: &[&str] = &["example.com", "test.com", "domain.com"];
const IMAGE_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"];

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").expect("valid email pattern")
});
static FORM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form").expect("valid form selector"));
static FIELD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input, textarea").expect("valid field selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));

/// Signals read from one page
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PageSignals {
    pub emails: Vec<String>,
    pub has_contact_form: bool,
    pub has_booking: bool,
    pub has_emergency_service: bool,
    pub has_financing: bool,
    pub tech_stack: Vec<String>,
    pub contact_url: Option<String>,
}

/// Distinct, lowercased addresses in document order
pub fn extract_emails(html: &str) -> Vec<String> {
    let mut emails: Vec<String> = Vec::new();
    for found in EMAIL_RE.find_iter(html) {
        let email = found.as_str().to_lowercase();
        let ignored = IGNORED_EMAIL_DOMAINS.iter().any(|d| email.ends_with(&format!("@{}", d)))
            || IMAGE_SUFFIXES.iter().any(|s| email.ends_with(s));
        if !ignored && !emails.contains(&email) {
            emails.push(email);
        }
    }
    emails
}

pub fn detect_tech_stack(html: &str) -> Vec<String> {
    let lower = html.to_lowercase();
    TECH_PATTERNS
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(tech, _)| tech.to_string())
        .collect()
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn has_contact_form(document: &Html) -> bool {
    document.select(&FORM_SELECTOR).any(|form| {
        form.select(&FIELD_SELECTOR).any(|field| {
            let attrs = ["type", "name", "id"]
                .iter()
                .filter_map(|a| field.value().attr(a))
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            contains_any(&attrs, FORM_FIELD_KEYWORDS)
        })
    })
}

fn find_contact_page(document: &Html, page_url: &Url) -> Option<String> {
    for link in document.select(&LINK_SELECTOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let href_lower = href.trim().to_lowercase();
        if href_lower.starts_with("mailto:") || href_lower.starts_with("tel:") || href_lower.starts_with('#') {
            continue;
        }
        let text = link.text().collect::<String>().to_lowercase();
        if !contains_any(&format!("{} {}", href_lower, text), CONTACT_KEYWORDS) {
            continue;
        }

        if let Ok(candidate) = page_url.join(href.trim()) {
            if candidate.host_str() == page_url.host_str() && candidate != *page_url {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

/// Read every homepage signal from raw HTML
pub fn analyze_page(html: &str, page_url: &Url) -> PageSignals {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ").to_lowercase();

    PageSignals {
        emails: extract_emails(html),
        has_contact_form: has_contact_form(&document),
        has_booking: contains_any(&text, BOOKING_KEYWORDS),
        has_emergency_service: contains_any(&text, EMERGENCY_KEYWORDS),
        has_financing: contains_any(&text, FINANCING_KEYWORDS),
        tech_stack: detect_tech_stack(html),
        contact_url: find_contact_page(&document, page_url),
    }
}

fn homepage_url(site: &str) -> Result<Url, FetchError> {
    let site = site.trim();
    let candidate = if site.contains("://") {
        site.to_string()
    } else {
        format!("https://{}", site)
    };
    Url::parse(&candidate).map_err(|e| FetchError::InvalidUrl {
        url: site.to_string(),
        reason: e.to_string(),
    })
}

pub struct WebsiteScraper {
    client: Arc<FetchClient>,
    priority: u32,
}

impl WebsiteScraper {
    pub fn new(client: Arc<FetchClient>, priority: u32) -> Self {
        Self { client, priority }
    }
}

#[async_trait]
impl EnrichmentAdapter for WebsiteScraper {
    fn name(&self) -> &str {
        "website"
    }

    fn quota_source(&self) -> &str {
        "website"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn applies_to(&self, lead: &Lead) -> bool {
        lead.real_website().is_some()
    }

    async fn enrich(&self, lead: &Lead) -> Result<Lead, AdapterError> {
        let site = lead
            .real_website()
            .ok_or_else(|| AdapterError::MissingInput(format!("'{}' has no website", lead.name)))?;
        let home = homepage_url(site)?;

        tracing::info!("Scraping website: {}", home);
        let homepage = self.client.get(home.as_str()).await?;
        let page = analyze_page(&homepage.body, &home);

        let mut enriched = lead.clone();
        let mut emails = page.emails.clone();

        if let Some(contact) = page.contact_url.as_deref() {
            match self.client.get(contact).await {
                Ok(response) => {
                    for email in extract_emails(&response.body) {
                        if !emails.contains(&email) {
                            emails.push(email);
                        }
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e.into()),
                Err(e) => {
                    tracing::debug!("Could not scrape contact page {}: {}", contact, e);
                    enriched.add_note(format!("Contact page not scraped: {}", e));
                }
            }
        }
        emails.sort();

        tracing::info!(
            "Scraped {}: {} emails, {}, {} tech detected",
            home,
            emails.len(),
            if page.has_contact_form { "form" } else { "no form" },
            page.tech_stack.len()
        );

        enriched.set_signal(signals::EMAILS, emails);
        enriched.set_signal(signals::HAS_CONTACT_FORM, page.has_contact_form);
        enriched.set_signal(signals::HAS_BOOKING, page.has_booking);
        enriched.set_signal(signals::HAS_EMERGENCY_SERVICE, page.has_emergency_service);
        enriched.set_signal(signals::HAS_FINANCING, page.has_financing);
        enriched.set_signal(signals::USES_HTTPS, home.scheme() == "https");
        enriched.set_signal(signals::TECH_STACK, page.tech_stack);
        enriched.set_signal(signals::WEBSITE_SCRAPED, true);

        Ok(enriched)
    }
}
