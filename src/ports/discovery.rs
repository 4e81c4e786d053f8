//! Discovery port
//!
//! A discovery adapter turns a search term and location into candidate
//! leads. Each call is one page and costs one unit of its quota source.

use async_trait::async_trait;
use thiserror::Error;

use super::fetch::{FetchError, FetchFailureKind};
use crate::domain::lead::PartialLead;

/// Errors any source adapter may report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Adapter unavailable: {0}")]
    Unavailable(String),
}

impl AdapterError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AdapterError::Fetch(e) if e.is_cancelled())
    }

    /// Fetch classification when the failure came from the network
    pub fn fetch_kind(&self) -> Option<FetchFailureKind> {
        match self {
            AdapterError::Fetch(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::MalformedResponse(err.to_string())
    }
}

/// One page of a discovery query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub term: String,
    pub location: String,
    /// Maximum results wanted from this page
    pub limit: usize,
    /// Results already taken from this adapter
    pub offset: usize,
}

impl DiscoveryRequest {
    pub fn new(term: impl Into<String>, location: impl Into<String>, limit: usize) -> Self {
        Self {
            term: term.into(),
            location: location.into(),
            limit,
            offset: 0,
        }
    }

    pub fn page(&self, limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            ..self.clone()
        }
    }
}

/// Leads mapped from one provider page
///
/// `fetched` counts the raw records the provider returned, including any
/// the adapter dropped while mapping, so paging never mistakes a filtered
/// page for the last one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryPage {
    pub leads: Vec<PartialLead>,
    /// Raw records on the page
    pub fetched: usize,
    /// Provider has nothing further for this query
    pub exhausted: bool,
}

impl DiscoveryPage {
    pub fn new(leads: Vec<PartialLead>, fetched: usize, exhausted: bool) -> Self {
        Self {
            leads,
            fetched,
            exhausted,
        }
    }

    /// Page whose raw size equals its mapped size
    pub fn complete(leads: Vec<PartialLead>, exhausted: bool) -> Self {
        let fetched = leads.len();
        Self::new(leads, fetched, exhausted)
    }

    /// Nothing more to fetch
    pub fn last(leads: Vec<PartialLead>) -> Self {
        Self::complete(leads, true)
    }
}

/// Lead source queried by the fallback chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscoveryAdapter: Send + Sync {
    /// Provenance tag for produced leads
    fn name(&self) -> &str;

    /// Ledger source charged per page
    fn quota_source(&self) -> &str;

    /// Lower runs first
    fn priority(&self) -> u32;

    /// Most results one call can return
    fn page_size(&self) -> usize;

    async fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryPage, AdapterError>;
}
