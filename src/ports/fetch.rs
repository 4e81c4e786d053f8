//! Fetch outcome types
//!
//! How a rate-limited fetch can fail, as seen by source adapters and event
//! sinks. Every failure is classified as transient (worth retrying),
//! permanent, or cancelled.

use serde::Serialize;
use thiserror::Error;

/// Coarse classification used by callers to decide what to record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchFailureKind {
    Transient,
    Permanent,
    Cancelled,
}

/// Errors surfaced by `FetchClient::fetch`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Malformed URL or a URL without a host
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Host name could not be resolved
    #[error("DNS resolution failed for {domain}: {message}")]
    Dns { domain: String, message: String },

    /// Non-retryable HTTP status (4xx other than 429)
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Transient failures on every allowed attempt
    #[error("Gave up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// The run was cancelled while waiting or in flight
    #[error("Request cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> FetchFailureKind {
        match self {
            FetchError::RetriesExhausted { .. } => FetchFailureKind::Transient,
            FetchError::Cancelled => FetchFailureKind::Cancelled,
            FetchError::InvalidUrl { .. } | FetchError::Dns { .. } | FetchError::HttpStatus { .. } => {
                FetchFailureKind::Permanent
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
