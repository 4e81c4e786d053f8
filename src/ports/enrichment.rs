//! Enrichment port

use async_trait::async_trait;

use super::discovery::AdapterError;
use crate::domain::lead::Lead;

/// Adds signals to an existing lead
///
/// `enrich` works on the caller's lead by reference and returns an updated
/// copy; the aggregator decides what to absorb.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrichmentAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn quota_source(&self) -> &str;

    fn priority(&self) -> u32;

    /// Whether the lead has what this adapter needs (e.g. a website)
    fn applies_to(&self, _lead: &Lead) -> bool {
        true
    }

    async fn enrich(&self, lead: &Lead) -> Result<Lead, AdapterError>;
}
