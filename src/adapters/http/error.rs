//! Transport Error Types
//!
//! Single-attempt failures reported by an `HttpTransport`, and the status
//! rules that decide whether the fetch client retries.

use thiserror::Error;

pub use crate::ports::fetch::{FetchError, FetchFailureKind};

/// Failure reported by an `HttpTransport` for a single attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("DNS lookup failed: {0}")]
    Dns(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Timeouts, resets and refused connections are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout | TransportError::Connect(_) | TransportError::Network(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else if err.is_connect() {
            if looks_like_dns_failure(&err) {
                TransportError::Dns(err.to_string())
            } else {
                TransportError::Connect(err.to_string())
            }
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// reqwest reports resolver failures as connect errors; the cause chain tells them apart
fn looks_like_dns_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_lowercase();
        if message.contains("dns")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("no such host")
        {
            return true;
        }
        current = e.source();
    }
    false
}

/// Retryable HTTP statuses: 429 and every 5xx
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
