//! Scoring Engine
//!
//! Converts a lead's signals into a 0-100 score and an A/B/C tier using a
//! weights table loaded once per run. Scoring is a pure function of the
//! signal map and the table, so rescoring after each enrichment stage is
//! idempotent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::sync::Arc;
use thiserror::Error;

use super::lead::{signals, Lead, SignalValue, Tier};

/// Default lower bound for tier A
pub const DEFAULT_TIER_A_THRESHOLD: f64 = 65.0;

/// Default lower bound for tier B
pub const DEFAULT_TIER_B_THRESHOLD: f64 = 45.0;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Tier thresholds must satisfy 0 <= tier_b < tier_a <= 100, got tier_a={tier_a}, tier_b={tier_b}")]
    InvalidThresholds { tier_a: f64, tier_b: f64 },

    #[error("Weight rule #{index} has an empty signal name")]
    EmptySignal { index: usize },

    #[error("Weight rule for '{signal}' has non-finite points")]
    InvalidPoints { signal: String },

    #[error("Weight rule for '{signal}' sets more than one condition")]
    ConflictingConditions { signal: String },
}

/// When a rule's signal counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SignalCondition {
    /// True, non-zero or non-empty
    Truthy,
    /// Exactly this value
    Equals(SignalValue),
    /// Numeric value (or list length) at or above
    AtLeast(f64),
    /// Text value, or any list item, among these (case-insensitive)
    OneOf(Vec<String>),
}

impl Default for SignalCondition {
    fn default() -> Self {
        SignalCondition::Truthy
    }
}

impl SignalCondition {
    pub fn matches(&self, value: &SignalValue) -> bool {
        match self {
            SignalCondition::Truthy => value.is_informative(),
            SignalCondition::Equals(expected) => value == expected,
            SignalCondition::AtLeast(min) => value.as_number().map_or(false, |n| n >= *min),
            SignalCondition::OneOf(options) => {
                let hit = |s: &str| options.iter().any(|o| o.eq_ignore_ascii_case(s.trim()));
                match value {
                    SignalValue::Text(s) => hit(s),
                    SignalValue::List(items) => items.iter().any(|i| hit(i)),
                    _ => false,
                }
            }
        }
    }
}

/// Shape of a rule in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WeightRuleEntry {
    signal: String,
    points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    equals: Option<SignalValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    at_least: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    one_of: Option<Vec<String>>,
}

impl From<WeightRule> for WeightRuleEntry {
    fn from(rule: WeightRule) -> Self {
        let mut entry = Self {
            signal: rule.signal,
            points: rule.points,
            equals: None,
            at_least: None,
            one_of: None,
        };
        match rule.condition {
            SignalCondition::Truthy => {}
            SignalCondition::Equals(value) => entry.equals = Some(value),
            SignalCondition::AtLeast(min) => entry.at_least = Some(min),
            SignalCondition::OneOf(options) => entry.one_of = Some(options),
        }
        entry
    }
}

/// Signed contribution of one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeightRuleEntry", into = "WeightRuleEntry")]
pub struct WeightRule {
    pub signal: String,
    pub points: f64,
    pub condition: SignalCondition,
}

impl TryFrom<WeightRuleEntry> for WeightRule {
    type Error = ScoringError;

    fn try_from(entry: WeightRuleEntry) -> Result<Self, Self::Error> {
        let mut conditions = Vec::new();
        if let Some(value) = entry.equals {
            conditions.push(SignalCondition::Equals(value));
        }
        if let Some(min) = entry.at_least {
            conditions.push(SignalCondition::AtLeast(min));
        }
        if let Some(options) = entry.one_of {
            conditions.push(SignalCondition::OneOf(options));
        }
        if conditions.len() > 1 {
            return Err(ScoringError::ConflictingConditions { signal: entry.signal });
        }

        Ok(Self {
            signal: entry.signal,
            points: entry.points,
            condition: conditions.pop().unwrap_or_default(),
        })
    }
}

impl WeightRule {
    pub fn new(signal: &str, points: f64) -> Self {
        Self {
            signal: signal.to_string(),
            points,
            condition: SignalCondition::Truthy,
        }
    }

    pub fn when(mut self, condition: SignalCondition) -> Self {
        self.condition = condition;
        self
    }
}

/// Signal weights plus tier cutoffs; immutable for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsTable {
    #[serde(default = "default_rules")]
    pub weights: Vec<WeightRule>,
    #[serde(default = "default_tier_a")]
    pub tier_a: f64,
    #[serde(default = "default_tier_b")]
    pub tier_b: f64,
}

fn default_tier_a() -> f64 {
    DEFAULT_TIER_A_THRESHOLD
}

fn default_tier_b() -> f64 {
    DEFAULT_TIER_B_THRESHOLD
}

fn default_rules() -> Vec<WeightRule> {
    vec![
        // Contactability
        WeightRule::new(signals::EMAILS, 15.0),
        WeightRule::new(signals::EMAIL_COUNT, 5.0).when(SignalCondition::AtLeast(2.0)),
        WeightRule::new(signals::HAS_PHONE, 10.0),
        WeightRule::new(signals::HAS_CONTACT_FORM, 10.0),
        // Digital presence
        WeightRule::new(signals::HAS_WEBSITE, 10.0),
        WeightRule::new(signals::HAS_WEBSITE, -15.0)
            .when(SignalCondition::Equals(SignalValue::Bool(false))),
        WeightRule::new(signals::USES_HTTPS, 5.0),
        WeightRule::new(signals::TECH_STACK, 10.0),
        // Business features
        WeightRule::new(signals::HAS_BOOKING, 12.0),
        WeightRule::new(signals::HAS_EMERGENCY_SERVICE, 8.0),
        WeightRule::new(signals::HAS_FINANCING, 10.0),
    ]
}

impl Default for WeightsTable {
    fn default() -> Self {
        Self {
            weights: default_rules(),
            tier_a: DEFAULT_TIER_A_THRESHOLD,
            tier_b: DEFAULT_TIER_B_THRESHOLD,
        }
    }
}

impl WeightsTable {
    pub fn new(weights: Vec<WeightRule>, tier_a: f64, tier_b: f64) -> Result<Self, ScoringError> {
        let table = Self {
            weights,
            tier_a,
            tier_b,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        let thresholds_ok = self.tier_a.is_finite()
            && self.tier_b.is_finite()
            && self.tier_b >= MIN_SCORE
            && self.tier_a <= MAX_SCORE
            && self.tier_a > self.tier_b;
        if !thresholds_ok {
            return Err(ScoringError::InvalidThresholds {
                tier_a: self.tier_a,
                tier_b: self.tier_b,
            });
        }

        for (index, rule) in self.weights.iter().enumerate() {
            if rule.signal.trim().is_empty() {
                return Err(ScoringError::EmptySignal { index });
            }
            if !rule.points.is_finite() {
                return Err(ScoringError::InvalidPoints {
                    signal: rule.signal.clone(),
                });
            }
        }
        Ok(())
    }

    /// Tier for a score; lower edges are inclusive
    pub fn tier_for(&self, score: f64) -> Tier {
        if score >= self.tier_a {
            Tier::A
        } else if score >= self.tier_b {
            Tier::B
        } else {
            Tier::C
        }
    }
}

/// One rule that fired
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub signal: String,
    pub points: f64,
}

/// Result of scoring a lead
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCard {
    pub score: f64,
    pub tier: Tier,
    pub breakdown: Vec<Contribution>,
}

/// Rule-based scorer shared across the run
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    table: Arc<WeightsTable>,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(WeightsTable::default())
    }
}

impl ScoringEngine {
    pub fn new(table: WeightsTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &WeightsTable {
        &self.table
    }

    /// Score a lead without touching it
    pub fn score(&self, lead: &Lead) -> ScoreCard {
        let evaluated = evaluated_signals(lead);
        let mut total = 0.0;
        let mut breakdown = Vec::new();

        for rule in &self.table.weights {
            let Some(value) = evaluated.get(&rule.signal) else {
                continue;
            };
            if rule.condition.matches(value) {
                total += rule.points;
                breakdown.push(Contribution {
                    signal: rule.signal.clone(),
                    points: rule.points,
                });
            }
        }

        let score = round_tenth(total.clamp(MIN_SCORE, MAX_SCORE));
        let tier = self.table.tier_for(score);

        tracing::debug!(
            "Scored '{}': {:.1} ({}) from {} signals",
            lead.name,
            score,
            tier,
            breakdown.len()
        );

        ScoreCard {
            score,
            tier,
            breakdown,
        }
    }

    /// Score a lead and record the result on it
    pub fn apply(&self, lead: &mut Lead) -> ScoreCard {
        let card = self.score(lead);
        lead.set_score(card.score, card.tier);
        card
    }

    pub fn apply_all(&self, leads: &mut [Lead]) {
        for lead in leads.iter_mut() {
            self.apply(lead);
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// The lead's signal map overlaid with signals implied by its fields
pub fn evaluated_signals(lead: &Lead) -> BTreeMap<String, SignalValue> {
    let mut evaluated = lead.signals.clone();

    if lead.phone.as_deref().map_or(false, |p| !p.trim().is_empty()) {
        evaluated.insert(signals::HAS_PHONE.to_string(), SignalValue::Bool(true));
    }

    if let Some(site) = lead.real_website() {
        evaluated.insert(signals::HAS_WEBSITE.to_string(), SignalValue::Bool(true));
        if site.trim().to_lowercase().starts_with("https://") {
            evaluated
                .entry(signals::USES_HTTPS.to_string())
                .or_insert(SignalValue::Bool(true));
        }
    }

    if let Some(SignalValue::List(emails)) = evaluated.get(signals::EMAILS) {
        let count = SignalValue::Number(emails.len() as f64);
        evaluated.insert(signals::EMAIL_COUNT.to_string(), count);
    }

    evaluated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lead::PartialLead;
    use approx::assert_relative_eq;

    fn lead_with(signals: &[(&str, SignalValue)]) -> Lead {
        let mut partial = PartialLead::new("ABC Heating");
        for (k, v) in signals {
            partial = partial.with_signal(k, v.clone());
        }
        Lead::from_partial(partial, "test")
    }

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        let table = WeightsTable::default();
        assert_eq!(table.tier_for(65.0), Tier::A);
        assert_eq!(table.tier_for(64.9), Tier::B);
        assert_eq!(table.tier_for(45.0), Tier::B);
        assert_eq!(table.tier_for(44.0), Tier::C);
        assert_eq!(table.tier_for(0.0), Tier::C);
    }

    #[test]
    fn test_exact_threshold_lead_is_tier_a() {
        // 15 email + 10 phone + 10 website + 12 booking + 8 emergency + 10 financing = 65
        let mut lead = lead_with(&[
            (signals::EMAILS, SignalValue::List(vec!["info@abc.ca".into()])),
            (signals::HAS_BOOKING, true.into()),
            (signals::HAS_EMERGENCY_SERVICE, true.into()),
            (signals::HAS_FINANCING, true.into()),
        ]);
        lead.phone = Some("905-555-0123".into());
        lead.website = Some("http://abc.ca".into());

        let card = ScoringEngine::default().score(&lead);
        assert_relative_eq!(card.score, 65.0);
        assert_eq!(card.tier, Tier::A);
    }

    #[test]
    fn test_absent_signals_contribute_nothing() {
        let lead = lead_with(&[]);
        let card = ScoringEngine::default().score(&lead);
        assert_eq!(card.score, 0.0);
        assert_eq!(card.tier, Tier::C);
        assert!(card.breakdown.is_empty());
    }

    #[test]
    fn test_explicit_no_website_penalty_is_clamped() {
        let lead = lead_with(&[(signals::HAS_WEBSITE, false.into())]);
        let card = ScoringEngine::default().score(&lead);
        assert_eq!(card.score, 0.0);
        assert_eq!(card.breakdown.len(), 1);
        assert_relative_eq!(card.breakdown[0].points, -15.0);
    }

    #[test]
    fn test_score_clamped_to_100() {
        let table = WeightsTable::new(
            vec![WeightRule::new("a", 80.0), WeightRule::new("b", 80.0)],
            65.0,
            45.0,
        )
        .unwrap();
        let lead = lead_with(&[("a", true.into()), ("b", true.into())]);
        assert_eq!(ScoringEngine::new(table).score(&lead).score, 100.0);
    }

    #[test]
    fn test_adding_positive_signal_never_decreases_score() {
        let engine = ScoringEngine::default();
        let base = lead_with(&[(signals::HAS_CONTACT_FORM, true.into())]);
        let base_score = engine.score(&base).score;

        for rule in engine.table().weights.iter().filter(|r| r.points > 0.0) {
            let mut richer = base.clone();
            let value = match &rule.condition {
                SignalCondition::AtLeast(n) => SignalValue::Number(*n),
                SignalCondition::Equals(v) => v.clone(),
                SignalCondition::OneOf(o) => SignalValue::Text(o[0].clone()),
                SignalCondition::Truthy => SignalValue::List(vec!["x".into()]),
            };
            richer.signals.insert(rule.signal.clone(), value);
            assert!(engine.score(&richer).score >= base_score, "rule {}", rule.signal);

            let mut poorer = richer.clone();
            poorer.signals.remove(&rule.signal);
            assert!(engine.score(&poorer).score <= engine.score(&richer).score);
        }
    }

    #[test]
    fn test_scoring_is_deterministic_and_rescoring_idempotent() {
        let engine = ScoringEngine::default();
        let mut lead = lead_with(&[
            (signals::EMAILS, SignalValue::List(vec!["a@x.ca".into(), "b@x.ca".into()])),
            (signals::TECH_STACK, SignalValue::List(vec!["WordPress".into()])),
        ]);
        lead.website = Some("https://x.ca".into());

        let first = engine.apply(&mut lead);
        let second = engine.apply(&mut lead);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        // 15 + 5 (two emails) + 10 website + 5 https + 10 tech
        assert_relative_eq!(first.score, 45.0);
        assert_eq!(first.tier, Tier::B);
    }

    #[test]
    fn test_placeholder_website_does_not_count() {
        let mut lead = lead_with(&[]);
        lead.website = Some("https://www.yelp.com/biz/abc".into());
        assert_eq!(ScoringEngine::default().score(&lead).score, 0.0);
    }

    #[test]
    fn test_conditions() {
        assert!(SignalCondition::AtLeast(2.0).matches(&SignalValue::List(vec!["a".into(), "b".into()])));
        assert!(!SignalCondition::AtLeast(2.0).matches(&SignalValue::Number(1.0)));
        assert!(SignalCondition::OneOf(vec!["WordPress".into()])
            .matches(&SignalValue::List(vec!["wordpress".into()])));
        assert!(SignalCondition::Equals(SignalValue::Bool(false)).matches(&SignalValue::Bool(false)));
        assert!(!SignalCondition::Truthy.matches(&SignalValue::Text("  ".into())));
    }

    #[test]
    fn test_validation_rejects_bad_thresholds() {
        assert!(WeightsTable::new(vec![], 45.0, 65.0).is_err());
        assert!(WeightsTable::new(vec![], 50.0, 50.0).is_err());
        assert!(WeightsTable::new(vec![], 120.0, 50.0).is_err());
        assert!(WeightsTable::new(vec![WeightRule::new(" ", 1.0)], 65.0, 45.0).is_err());
        assert!(WeightsTable::new(vec![WeightRule::new("x", f64::NAN)], 65.0, 45.0).is_err());
    }

    #[test]
    fn test_rules_deserialize_from_toml() {
        let table: WeightsTable = toml::from_str(
            r#"
tier_a = 70
tier_b = 40

[[weights]]
signal = "emails"
points = 15

[[weights]]
signal = "email_count"
points = 5
at_least = 2

[[weights]]
signal = "has_website"
points = -15
equals = false
"#,
        )
        .unwrap();

        assert_eq!(table.weights.len(), 3);
        assert_eq!(table.weights[1].condition, SignalCondition::AtLeast(2.0));
        assert_eq!(
            table.weights[2].condition,
            SignalCondition::Equals(SignalValue::Bool(false))
        );
        assert_eq!(table.tier_a, 70.0);
    }

    #[test]
    fn test_dumped_weights_load_back() {
        let table = WeightsTable::default();
        let dumped = serde_json::to_value(&table).unwrap();

        let no_site = dumped["weights"]
            .as_array()
            .unwrap()
            .iter()
            .find(|rule| rule["signal"] == "has_website" && rule["points"] == -15.0)
            .unwrap();
        assert_eq!(no_site["equals"], serde_json::json!(false));
        assert!(no_site.get("condition").is_none());

        let reloaded: WeightsTable = serde_json::from_value(dumped).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn test_conflicting_conditions_rejected() {
        let parsed: Result<WeightsTable, _> = toml::from_str(
            r#"
[[weights]]
signal = "x"
points = 1
at_least = 2
equals = true
"#,
        );
        assert!(parsed.is_err());
    }
}
