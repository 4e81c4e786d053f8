//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Lead discovery providers
//! - Lead enrichment providers
//! - Quota ledger persistence
//! - Fetch failure classification
//! - Event delivery and lead export

pub mod discovery;
pub mod enrichment;
pub mod events;
pub mod export;
pub mod fetch;
pub mod mocks;
pub mod quota_store;

// Re-export main traits and types
pub use discovery::{AdapterError, DiscoveryAdapter, DiscoveryPage, DiscoveryRequest};
pub use enrichment::EnrichmentAdapter;
pub use events::{EventSink, NullEventSink, Phase, PipelineEvent};
pub use export::{ExportError, ExportSummary, LeadExporter};
pub use fetch::{FetchError, FetchFailureKind};
pub use quota_store::{PersistError, QuotaStore};
