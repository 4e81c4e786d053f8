//! Lead Scout - Quota-Aware Lead Acquisition Library
//!
//! Discovers business leads through a fallback chain of rate-limited
//! providers, enriches them through a score-gated staircase and scores them
//! into tiers, without ever exceeding a provider's call budget.
//!
//! # Modules
//!
//! - `domain`: Core logic (Lead, QuotaLedger, deduplication, ScoringEngine)
//! - `ports`: Trait abstractions (DiscoveryAdapter, EnrichmentAdapter, QuotaStore, EventSink, LeadExporter)
//! - `adapters`: External implementations (fetch client, Yelp, Google Places, website scraper, Hunter, Tavily, storage, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Fallback aggregator, pipeline and wiring

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
