//! Configuration Loader
//!
//! Loads and validates the run configuration from a TOML file.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::adapters::http::{
    FetchConfig, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_JITTER_RATIO, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_BACKOFF, DEFAULT_USER_AGENTS,
};
use crate::domain::quota::{QuotaLimit, DEFAULT_DAILY_ALERT_RATIO, DEFAULT_MONTHLY_ALERT_RATIO};
use crate::domain::scoring::{WeightsTable, MAX_SCORE, MIN_SCORE};

/// Discovery providers this build knows how to construct
pub const DISCOVERY_PROVIDERS: &[&str] = &["google_places", "yelp"];

/// Enrichment providers this build knows how to construct
pub const ENRICHMENT_PROVIDERS: &[&str] = &["website_discovery", "website", "hunter", "tavily"];

/// Upper bound on `fetch.max_attempts`
pub const MAX_FETCH_ATTEMPTS: u32 = 20;

/// Main configuration structure matching config/default.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub quota: Vec<QuotaLimit>,
    #[serde(default)]
    pub discovery: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub enrichment: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub scoring: WeightsTable,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Fetch client section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    /// Minimum spacing between requests to one domain
    pub min_interval_ms: u64,
    /// Hard bound on one attempt
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
    /// Ceiling on any single backoff
    pub max_backoff_ms: u64,
    pub jitter_ratio: f64,
    pub user_agents: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            min_interval_ms: 1500,
            timeout_ms: 8000,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: 2000,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_backoff_ms: DEFAULT_MAX_BACKOFF.as_millis() as u64,
            jitter_ratio: DEFAULT_JITTER_RATIO,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FetchSection {
    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig {
            min_interval: Duration::from_millis(self.min_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            jitter_ratio: self.jitter_ratio,
            user_agents: self.user_agents.clone(),
        }
    }
}

/// Quota ledger section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// Ledger file; `~` is expanded
    pub path: String,
    pub monthly_alert_ratio: f64,
    pub daily_alert_ratio: f64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            path: "data/api_usage.json".to_string(),
            monthly_alert_ratio: DEFAULT_MONTHLY_ALERT_RATIO,
            daily_alert_ratio: DEFAULT_DAILY_ALERT_RATIO,
        }
    }
}

/// One discovery or enrichment provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower runs first
    #[serde(default)]
    pub priority: u32,
    /// Enrichment only: minimum current score to reach this provider
    #[serde(default)]
    pub min_score: f64,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 0,
            min_score: 0.0,
            api_key: None,
            api_url: None,
        }
    }
}

impl ProviderConfig {
    /// Get the API key, falling back to the provider's environment variable
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.trim().is_empty() {
                return Some(key.clone());
            }
        }
        api_key_env_var(provider)
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Environment variable holding a provider's API key
pub fn api_key_env_var(provider: &str) -> Option<&'static str> {
    match provider {
        "google_places" => Some("GOOGLE_API_KEY"),
        "yelp" => Some("YELP_API_KEY"),
        "hunter" => Some("HUNTER_API_KEY"),
        "tavily" => Some("TAVILY_API_KEY"),
        _ => None,
    }
}

/// Pipeline section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Leads enriched in parallel within one stage
    pub enrichment_concurrency: usize,
    /// Cancel the run after this many seconds
    pub run_timeout_secs: Option<u64>,
    pub default_limit: usize,
    pub output: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            enrichment_concurrency: 1,
            run_timeout_secs: None,
            default_limit: 50,
            output: "output/leads.json".to_string(),
        }
    }
}

impl PipelineSection {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// EnvFilter directive used when no CLI flag or RUST_LOG is given
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration text
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_fetch()?;
        self.validate_ledger()?;

        self.scoring
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let mut quota_sources = HashSet::new();
        for limit in &self.quota {
            if limit.source.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "quota source cannot be empty".to_string(),
                ));
            }
            if !quota_sources.insert(limit.source.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "quota for '{}' is declared twice",
                    limit.source
                )));
            }
        }

        for (name, provider) in &self.discovery {
            check_provider(name, provider, DISCOVERY_PROVIDERS, &quota_sources)?;
        }
        for (name, provider) in &self.enrichment {
            check_provider(name, provider, ENRICHMENT_PROVIDERS, &quota_sources)?;
            if !(MIN_SCORE..=MAX_SCORE).contains(&provider.min_score) {
                return Err(ConfigError::ValidationError(format!(
                    "min_score for '{}' must be 0-100, got {}",
                    name, provider.min_score
                )));
            }
        }

        // Later stages may never be easier to reach than earlier ones
        let staircase = self.enrichment_staircase();
        for pair in staircase.windows(2) {
            let (prev_name, prev) = pair[0];
            let (name, provider) = pair[1];
            if provider.min_score < prev.min_score {
                return Err(ConfigError::ValidationError(format!(
                    "enrichment thresholds must not decrease: '{}' (priority {}, min_score {}) runs after '{}' (min_score {})",
                    name, provider.priority, provider.min_score, prev_name, prev.min_score
                )));
            }
        }

        if self.pipeline.enrichment_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "enrichment_concurrency must be >= 1".to_string(),
            ));
        }
        if self.pipeline.default_limit == 0 {
            return Err(ConfigError::ValidationError(
                "default_limit must be >= 1".to_string(),
            ));
        }
        if self.pipeline.run_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "run_timeout_secs must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_fetch(&self) -> Result<(), ConfigError> {
        let fetch = &self.fetch;
        if !(1..=MAX_FETCH_ATTEMPTS).contains(&fetch.max_attempts) {
            return Err(ConfigError::ValidationError(format!(
                "max_attempts must be 1-{}, got {}",
                MAX_FETCH_ATTEMPTS, fetch.max_attempts
            )));
        }
        if fetch.max_backoff_ms == 0 || fetch.max_backoff_ms < fetch.backoff_base_ms {
            return Err(ConfigError::ValidationError(format!(
                "max_backoff_ms must be > 0 and >= backoff_base_ms ({}), got {}",
                fetch.backoff_base_ms, fetch.max_backoff_ms
            )));
        }
        if fetch.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_ms must be > 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&fetch.jitter_ratio) {
            return Err(ConfigError::ValidationError(format!(
                "jitter_ratio must be in [0, 1), got {}",
                fetch.jitter_ratio
            )));
        }
        // Jitter must not be able to make a later backoff shorter than an earlier one
        if fetch.backoff_multiplier <= 1.0 + fetch.jitter_ratio {
            return Err(ConfigError::ValidationError(format!(
                "backoff_multiplier must exceed 1 + jitter_ratio ({}), got {}",
                1.0 + fetch.jitter_ratio,
                fetch.backoff_multiplier
            )));
        }
        if fetch.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "user_agents cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_ledger(&self) -> Result<(), ConfigError> {
        if self.ledger.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ledger path cannot be empty".to_string(),
            ));
        }
        for (name, ratio) in [
            ("monthly_alert_ratio", self.ledger.monthly_alert_ratio),
            ("daily_alert_ratio", self.ledger.daily_alert_ratio),
        ] {
            if ratio <= 0.0 || ratio > 1.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in (0, 1], got {}",
                    name, ratio
                )));
            }
        }
        Ok(())
    }

    /// Enabled enrichment providers in stage order
    pub fn enrichment_staircase(&self) -> Vec<(&str, &ProviderConfig)> {
        let mut stages: Vec<(&str, &ProviderConfig)> = self
            .enrichment
            .iter()
            .filter(|(_, p)| p.enabled)
            .map(|(name, p)| (name.as_str(), p))
            .collect();
        stages.sort_by_key(|(_, p)| p.priority);
        stages
    }
}

fn check_provider(
    name: &str,
    provider: &ProviderConfig,
    known: &[&str],
    quota_sources: &HashSet<&str>,
) -> Result<(), ConfigError> {
    if !known.contains(&name) {
        return Err(ConfigError::ValidationError(format!(
            "unknown provider '{}' (expected one of {})",
            name,
            known.join(", ")
        )));
    }
    if provider.enabled && !quota_sources.contains(name) {
        return Err(ConfigError::ValidationError(format!(
            "provider '{}' is enabled but has no [[quota]] entry",
            name
        )));
    }
    Ok(())
}
