//! Enrichment Adapters
//!
//! Each adapter takes a copy of a lead and returns it with extra signals.
//! The aggregator decides which leads reach which adapter.

pub mod hunter;
pub mod tavily;
pub mod website;
pub mod website_discovery;

pub use hunter::HunterEmailFinder;
pub use tavily::TavilyResearcher;
pub use website::WebsiteScraper;
pub use website_discovery::WebsiteFinder;
