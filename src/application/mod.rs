//! Application Layer
//!
//! The fallback aggregator, the run pipeline and the wiring that builds
//! them from configuration.

pub mod aggregator;
pub mod bootstrap;
pub mod pipeline;

pub use aggregator::{AggregatorConfig, EnrichmentStage, FallbackAggregator, StageStats};
pub use bootstrap::{build_pipeline, open_ledger, BootstrapError};
pub use pipeline::{LeadPipeline, PipelineError, RunReport};
