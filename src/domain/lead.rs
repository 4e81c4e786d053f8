//! Lead Model
//!
//! Canonical business-lead record carried through discovery, enrichment,
//! scoring and export, plus the signal vocabulary adapters map into.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::dedup::{normalize_domain, normalize_name, phone_digits};

/// Canonical signal names shared by adapters and the scoring table
pub mod signals {
    pub const HAS_PHONE: &str = "has_phone";
    pub const HAS_WEBSITE: &str = "has_website";
    pub const USES_HTTPS: &str = "uses_https";
    pub const HAS_CONTACT_FORM: &str = "has_contact_form";
    pub const HAS_BOOKING: &str = "has_booking";
    pub const HAS_EMERGENCY_SERVICE: &str = "has_emergency_service";
    pub const HAS_FINANCING: &str = "has_financing";
    pub const EMAILS: &str = "emails";
    pub const EMAIL_COUNT: &str = "email_count";
    pub const TECH_STACK: &str = "tech_stack";
    pub const RATING: &str = "rating";
    pub const REVIEW_COUNT: &str = "review_count";
    pub const PRICE_LEVEL: &str = "price_level";
    pub const CATEGORIES: &str = "categories";
    pub const EMAILS_VERIFIED: &str = "emails_verified";
    pub const EMAIL_CONFIDENCE: &str = "email_confidence";
    pub const RECENT_ACTIVITY: &str = "recent_activity";
    pub const REPUTATION_SCORE: &str = "reputation_score";
    pub const SOURCES_FOUND: &str = "sources_found";
    pub const REVIEW_SITES: &str = "review_sites";
    pub const NEGATIVE_FLAGS: &str = "negative_flags";
    pub const WEBSITE_SCRAPED: &str = "website_scraped";
}

/// Directory and listing hosts that stand in for a business website
const PLACEHOLDER_HOSTS: &[&str] = &[
    "yelp.com",
    "yelp.ca",
    "google.com",
    "maps.google.com",
    "facebook.com",
    "yellowpages.com",
    "yellowpages.ca",
];

/// Returns true when the URL points at a directory listing rather than
/// the business's own site
pub fn is_placeholder_website(url: &str) -> bool {
    match normalize_domain(url) {
        Some(domain) => PLACEHOLDER_HOSTS
            .iter()
            .any(|host| domain == *host || domain.ends_with(&format!(".{}", host))),
        None => true,
    }
}

/// Value stored in a lead's signal map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl SignalValue {
    /// Whether the value carries positive information (true, non-zero, non-empty)
    pub fn is_informative(&self) -> bool {
        match self {
            SignalValue::Bool(b) => *b,
            SignalValue::Number(n) => *n != 0.0 && n.is_finite(),
            SignalValue::Text(s) => !s.trim().is_empty(),
            SignalValue::List(items) => !items.is_empty(),
        }
    }

    /// Numeric view used by threshold conditions; lists count their items
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SignalValue::Number(n) => Some(*n),
            SignalValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            SignalValue::List(items) => Some(items.len() as f64),
            SignalValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        SignalValue::Bool(value)
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        SignalValue::Number(value)
    }
}

impl From<u32> for SignalValue {
    fn from(value: u32) -> Self {
        SignalValue::Number(value as f64)
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        SignalValue::Text(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        SignalValue::Text(value)
    }
}

impl From<Vec<String>> for SignalValue {
    fn from(value: Vec<String>) -> Self {
        SignalValue::List(value)
    }
}

/// Discrete quality bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    C,
    Unscored,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::A => write!(f, "A"),
            Tier::B => write!(f, "B"),
            Tier::C => write!(f, "C"),
            Tier::Unscored => write!(f, "Unscored"),
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Unscored
    }
}

/// Where a lead sits in the scoring lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringStatus {
    Unscored,
    Scored(Tier),
    Rescored(Tier),
}

/// Discovery result before the aggregator tags it with provenance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialLead {
    pub name: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub source_url: Option<String>,
    /// Google place identifier, used to look up listing details later
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub signals: BTreeMap<String, SignalValue>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl PartialLead {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_location(mut self, city: impl Into<String>, region: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self.region = Some(region.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_place_id(mut self, place_id: impl Into<String>) -> Self {
        self.place_id = Some(place_id.into());
        self
    }

    pub fn with_signal(mut self, key: &str, value: impl Into<SignalValue>) -> Self {
        self.signals.insert(key.to_string(), value.into());
        self
    }
}

/// A candidate business tracked through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub name: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    pub signals: BTreeMap<String, SignalValue>,
    pub score: f64,
    pub tier: Tier,
    provenance: Vec<String>,
    pub notes: Vec<String>,
    #[serde(default)]
    scoring_passes: u32,
}

impl Lead {
    /// Build a lead from a discovery result, recording the producing source
    pub fn from_partial(partial: PartialLead, source: &str) -> Self {
        let website = partial
            .website
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty());

        Self {
            name: partial.name.trim().to_string(),
            city: partial.city,
            region: partial.region,
            phone: partial.phone.filter(|p| !p.trim().is_empty()),
            website,
            source_url: partial.source_url,
            place_id: partial.place_id.filter(|id| !id.trim().is_empty()),
            signals: partial.signals,
            score: 0.0,
            tier: Tier::Unscored,
            provenance: vec![source.to_string()],
            notes: partial.notes,
            scoring_passes: 0,
        }
    }

    /// Sources that produced or augmented this lead, oldest first
    pub fn provenance(&self) -> &[String] {
        &self.provenance
    }

    /// First source that discovered the lead
    pub fn discovered_by(&self) -> Option<&str> {
        self.provenance.first().map(String::as_str)
    }

    /// Append a source; repeated names are kept once
    pub fn add_provenance(&mut self, source: &str) {
        if !self.provenance.iter().any(|p| p == source) {
            self.provenance.push(source.to_string());
        }
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn signal(&self, key: &str) -> Option<&SignalValue> {
        self.signals.get(key)
    }

    /// Set a signal unless an informative value is already present;
    /// lists gain the items they are missing
    pub fn set_signal(&mut self, key: &str, value: impl Into<SignalValue>) {
        let value = value.into();
        if let (Some(SignalValue::List(items)), SignalValue::List(incoming)) =
            (self.signals.get_mut(key), &value)
        {
            for item in incoming {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
            return;
        }

        let keep_existing = match self.signals.get(key) {
            Some(existing) => existing.is_informative() || !value.is_informative(),
            None => false,
        };
        if !keep_existing {
            self.signals.insert(key.to_string(), value);
        }
    }

    /// Email addresses found so far, primary first
    pub fn emails(&self) -> &[String] {
        match self.signals.get(signals::EMAILS) {
            Some(SignalValue::List(emails)) => emails,
            _ => &[],
        }
    }

    /// Website that is not a directory placeholder
    pub fn real_website(&self) -> Option<&str> {
        self.website
            .as_deref()
            .filter(|w| !is_placeholder_website(w))
    }

    /// Set the website if empty, or upgrade a placeholder to a real site
    pub fn offer_website(&mut self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        if candidate.is_empty() || (is_placeholder_website(candidate) && self.website.is_some()) {
            return false;
        }
        match self.website.as_deref() {
            None => {
                self.website = Some(candidate.to_string());
                true
            }
            Some(current) if is_placeholder_website(current) && !is_placeholder_website(candidate) => {
                self.website = Some(candidate.to_string());
                true
            }
            _ => false,
        }
    }

    /// Normalized domain of the real website, if any
    pub fn domain(&self) -> Option<String> {
        self.real_website().and_then(normalize_domain)
    }

    /// Provisional identity: domain, else normalized name plus phone digits
    pub fn key(&self) -> String {
        if let Some(domain) = self.domain() {
            return format!("domain:{}", domain);
        }
        let digits = self.phone.as_deref().map(phone_digits).unwrap_or_default();
        format!("name_phone:{}:{}", normalize_name(&self.name), digits)
    }

    /// Fill gaps from a duplicate of this lead; earlier values always win
    pub fn merge_from(&mut self, other: &Lead) {
        fill(&mut self.city, &other.city);
        fill(&mut self.region, &other.region);
        fill(&mut self.phone, &other.phone);
        fill(&mut self.source_url, &other.source_url);
        fill(&mut self.place_id, &other.place_id);
        if let Some(website) = other.website.as_deref() {
            self.offer_website(website);
        }
        for (key, value) in &other.signals {
            self.set_signal(key, value.clone());
        }
        for source in &other.provenance {
            self.add_provenance(source);
        }
        for note in &other.notes {
            if !self.notes.contains(note) {
                self.notes.push(note.clone());
            }
        }
    }

    /// Take what an enrichment adapter learned from its copy of this lead
    pub fn absorb(&mut self, enriched: Lead, source: &str) {
        let known_notes = self.notes.len();

        fill(&mut self.city, &enriched.city);
        fill(&mut self.region, &enriched.region);
        fill(&mut self.phone, &enriched.phone);
        if let Some(website) = enriched.website.as_deref() {
            self.offer_website(website);
        }
        for (key, value) in enriched.signals {
            self.set_signal(&key, value);
        }
        for note in enriched.notes.into_iter().skip(known_notes) {
            self.notes.push(note);
        }
        self.add_provenance(source);
    }

    /// Record a scoring pass
    pub fn set_score(&mut self, score: f64, tier: Tier) {
        self.score = score;
        self.tier = tier;
        self.scoring_passes = self.scoring_passes.saturating_add(1);
    }

    pub fn scoring_status(&self) -> ScoringStatus {
        match self.scoring_passes {
            0 => ScoringStatus::Unscored,
            1 => ScoringStatus::Scored(self.tier),
            _ => ScoringStatus::Rescored(self.tier),
        }
    }
}

fn fill(slot: &mut Option<String>, candidate: &Option<String>) {
    if slot.as_deref().map_or(true, |s| s.trim().is_empty()) {
        if let Some(value) = candidate.as_deref().filter(|v| !v.trim().is_empty()) {
            *slot = Some(value.to_string());
        }
    }
}
