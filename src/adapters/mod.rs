//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - HTTP: rate-limited fetch client shared by all providers
//! - Discovery: Yelp Fusion and Google Places search
//! - Enrichment: website scraping, Hunter.io and Tavily
//! - Storage: quota ledger persistence
//! - Export: JSON lead files
//! - Logging: tracing setup and event sink
//! - CLI: command-line interface definitions

pub mod cli;
pub mod discovery;
pub mod enrichment;
pub mod export;
pub mod http;
pub mod logging;
pub mod storage;

pub use cli::CliApp;
pub use discovery::{GooglePlacesAdapter, YelpFusionAdapter};
pub use enrichment::{HunterEmailFinder, TavilyResearcher, WebsiteScraper};
pub use export::JsonExporter;
pub use http::{FetchClient, FetchConfig};
pub use logging::TracingEventSink;
pub use storage::{JsonQuotaStore, MemoryQuotaStore};
