//! Bootstrap
//!
//! Wires a validated `AppConfig` into a ready pipeline: one fetch client and
//! one quota ledger shared by every adapter, the discovery chain and the
//! enrichment staircase.

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::aggregator::{AggregatorConfig, FallbackAggregator};
use super::pipeline::LeadPipeline;
use crate::adapters::discovery::{GooglePlacesAdapter, YelpFusionAdapter};
use crate::adapters::enrichment::{HunterEmailFinder, TavilyResearcher, WebsiteFinder, WebsiteScraper};
use crate::adapters::export::{exporter_for, ExportFormat};
use crate::adapters::http::{FetchClient, TransportError};
use crate::adapters::storage::JsonQuotaStore;
use crate::config::{api_key_env_var, AppConfig, ProviderConfig};
use crate::domain::quota::QuotaLedger;
use crate::domain::scoring::ScoringEngine;
use crate::ports::discovery::DiscoveryAdapter;
use crate::ports::enrichment::EnrichmentAdapter;
use crate::ports::events::EventSink;
use crate::ports::quota_store::PersistError;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to create HTTP client: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to open quota ledger: {0}")]
    Ledger(#[from] PersistError),

    #[error("No discovery provider is enabled with an API key")]
    NoDiscoveryProviders,
}

/// Open the ledger file named in the config
pub fn open_ledger(config: &AppConfig) -> Result<Arc<QuotaLedger>, PersistError> {
    let store = JsonQuotaStore::new(&config.ledger.path);
    tracing::debug!("Opening quota ledger at {}", store.path().display());
    Ok(Arc::new(QuotaLedger::open(Arc::new(store), &config.quota)?))
}

fn api_key(name: &str, provider: &ProviderConfig) -> Option<String> {
    let key = provider.resolve_api_key(name);
    if key.is_none() {
        tracing::warn!(
            "{} is enabled but has no API key (set api_key or {}); skipping it",
            name,
            api_key_env_var(name).unwrap_or("an environment variable")
        );
    }
    key
}

/// Another provider's key and endpoint, from its own section or its environment variable
fn borrowed_credentials(config: &AppConfig, provider: &str) -> Option<(String, Option<String>)> {
    let section = config
        .discovery
        .get(provider)
        .or_else(|| config.enrichment.get(provider));
    match section {
        Some(p) => p.resolve_api_key(provider).map(|key| (key, p.api_url.clone())),
        None => ProviderConfig::default()
            .resolve_api_key(provider)
            .map(|key| (key, None)),
    }
}

fn build_website_finder(
    provider: &ProviderConfig,
    config: &AppConfig,
    client: &Arc<FetchClient>,
    ledger: &Arc<QuotaLedger>,
) -> Option<WebsiteFinder> {
    let mut finder = WebsiteFinder::new(client.clone(), ledger.clone(), provider.priority);
    let places = borrowed_credentials(config, "google_places");
    let search = borrowed_credentials(config, "tavily");
    if places.is_none() && search.is_none() {
        tracing::warn!(
            "website_discovery is enabled but neither {} nor {} is set; skipping it",
            api_key_env_var("google_places").unwrap_or("a Google key"),
            api_key_env_var("tavily").unwrap_or("a Tavily key")
        );
        return None;
    }

    if let Some((key, _)) = places {
        finder = finder.with_places(key);
        if let Some(ref url) = provider.api_url {
            finder = finder.with_places_url(url);
        }
    }
    if let Some((key, url)) = search {
        finder = finder.with_search(key);
        if let Some(url) = url {
            finder = finder.with_search_url(url);
        }
    }
    Some(finder)
}

fn build_discovery(
    name: &str,
    provider: &ProviderConfig,
    client: &Arc<FetchClient>,
) -> Option<Arc<dyn DiscoveryAdapter>> {
    let key = api_key(name, provider)?;
    let adapter: Arc<dyn DiscoveryAdapter> = match name {
        "google_places" => {
            let mut adapter = GooglePlacesAdapter::new(client.clone(), key, provider.priority);
            if let Some(ref url) = provider.api_url {
                adapter = adapter.with_api_url(url);
            }
            Arc::new(adapter)
        }
        "yelp" => {
            let mut adapter = YelpFusionAdapter::new(client.clone(), key, provider.priority);
            if let Some(ref url) = provider.api_url {
                adapter = adapter.with_api_url(url);
            }
            Arc::new(adapter)
        }
        _ => return None,
    };
    Some(adapter)
}

fn build_enrichment(
    name: &str,
    provider: &ProviderConfig,
    config: &AppConfig,
    client: &Arc<FetchClient>,
    ledger: &Arc<QuotaLedger>,
) -> Option<Arc<dyn EnrichmentAdapter>> {
    let adapter: Arc<dyn EnrichmentAdapter> = match name {
        "website_discovery" => Arc::new(build_website_finder(provider, config, client, ledger)?),
        "website" => Arc::new(WebsiteScraper::new(client.clone(), provider.priority)),
        "hunter" => {
            let mut adapter =
                HunterEmailFinder::new(client.clone(), api_key(name, provider)?, provider.priority);
            if let Some(ref url) = provider.api_url {
                adapter = adapter.with_api_url(url);
            }
            Arc::new(adapter)
        }
        "tavily" => {
            let mut adapter =
                TavilyResearcher::new(client.clone(), api_key(name, provider)?, provider.priority);
            if let Some(ref url) = provider.api_url {
                adapter = adapter.with_api_url(url);
            }
            Arc::new(adapter)
        }
        _ => return None,
    };
    Some(adapter)
}

/// Build the pipeline for one run
///
/// Leads are exported to `output`, as CSV or JSON per `format` or else the
/// file extension. `cancel` is shared by the fetch client and the
/// aggregator, so cancelling it (or the pipeline's run timeout firing)
/// aborts in-flight requests.
pub fn build_pipeline(
    config: &AppConfig,
    output: &str,
    format: Option<ExportFormat>,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
) -> Result<(LeadPipeline, Arc<QuotaLedger>), BootstrapError> {
    let client = Arc::new(
        FetchClient::new(config.fetch.to_fetch_config())?.with_cancellation(cancel.clone()),
    );
    let ledger = open_ledger(config)?;

    let mut aggregator = FallbackAggregator::new(
        ledger.clone(),
        ScoringEngine::new(config.scoring.clone()),
        events,
    )
    .with_config(AggregatorConfig {
        monthly_alert_ratio: config.ledger.monthly_alert_ratio,
        daily_alert_ratio: config.ledger.daily_alert_ratio,
        enrichment_concurrency: config.pipeline.enrichment_concurrency,
    })
    .with_cancellation(cancel);

    let mut discovery_count = 0;
    for (name, provider) in config.discovery.iter().filter(|(_, p)| p.enabled) {
        if let Some(adapter) = build_discovery(name, provider, &client) {
            tracing::info!("Discovery: {} (priority {})", name, provider.priority);
            aggregator = aggregator.with_discovery(adapter);
            discovery_count += 1;
        }
    }
    if discovery_count == 0 {
        return Err(BootstrapError::NoDiscoveryProviders);
    }

    for (name, provider) in config.enrichment_staircase() {
        if let Some(adapter) = build_enrichment(name, provider, config, &client, &ledger) {
            tracing::info!(
                "Enrichment: {} (priority {}, min score {})",
                name,
                provider.priority,
                provider.min_score
            );
            aggregator = aggregator.with_stage(adapter, provider.min_score);
        }
    }

    let exporter = exporter_for(output, format);
    tracing::info!(
        "Exporting to {} as {}",
        output,
        format.unwrap_or_else(|| ExportFormat::from_path(output))
    );
    let pipeline = LeadPipeline::new(aggregator, exporter).with_run_timeout(config.pipeline.run_timeout());

    Ok((pipeline, ledger))
}
