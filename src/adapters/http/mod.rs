//! HTTP Adapter
//!
//! Rate-limited, retrying fetch client shared by all provider adapters.

mod client;
mod error;
mod pacer;
mod transport;

pub use client::{
    AttemptOutcome, FetchAttempt, FetchClient, FetchConfig, FetchRequest, FetchResponse,
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_JITTER_RATIO, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF,
    DEFAULT_USER_AGENTS,
};
pub use error::{is_retryable_status, FetchError, FetchFailureKind, TransportError};
pub use pacer::DomainPacer;
pub use transport::{
    HttpMethod, HttpTransport, ReqwestTransport, ScriptedTransport, TransportRequest,
    TransportResponse,
};
