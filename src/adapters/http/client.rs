//! Rate-Limited Fetch Client
//!
//! Shared HTTP client for every provider adapter. Adds per-domain pacing,
//! bounded retries with exponential backoff and jitter, a hard per-attempt
//! timeout, User-Agent rotation and run-wide cancellation on top of a
//! single-attempt `HttpTransport`.

use rand::Rng;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::{is_retryable_status, FetchError, TransportError};
use super::pacer::DomainPacer;
use super::transport::{
    HttpMethod, HttpTransport, ReqwestTransport, TransportRequest, TransportResponse,
};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER_RATIO: f64 = 0.25;
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Fetch client tuning
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Minimum spacing between requests to one domain
    pub min_interval: Duration,
    /// Absolute bound on a single attempt
    pub timeout: Duration,
    /// Total attempts including the first
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
    /// Ceiling on any single backoff, jitter included
    pub max_backoff: Duration,
    /// Upper bound of the random extra delay, as a fraction of the backoff
    pub jitter_ratio: f64,
    pub user_agents: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_backoff: DEFAULT_MAX_BACKOFF,
            jitter_ratio: DEFAULT_JITTER_RATIO,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FetchConfig {
    /// Backoff before retry `n` (1-based), without jitter, capped at `max_backoff`
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        self.capped(self.backoff_base.as_secs_f64() * factor)
    }

    fn capped(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// A request as adapters describe it
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// How one attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(u16),
    HttpStatus(u16),
    Timeout,
    Transport(String),
}

/// Diagnostic record of one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FetchAttempt {
    pub domain: String,
    pub attempt: u32,
    /// Backoff slept before this attempt (zero for the first)
    pub backoff: Duration,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    pub attempts: Vec<FetchAttempt>,
}

impl FetchResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Backoff delays slept between attempts, in order
    pub fn backoffs(&self) -> Vec<Duration> {
        self.attempts
            .iter()
            .skip(1)
            .map(|a| a.backoff)
            .collect()
    }
}

/// Pacing, retrying HTTP client shared by all adapters of a run
pub struct FetchClient {
    config: FetchConfig,
    transport: Arc<dyn HttpTransport>,
    pacer: DomainPacer,
    agent_cursor: AtomicUsize,
    cancel: CancellationToken,
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient")
            .field("config", &self.config)
            .finish()
    }
}

impl FetchClient {
    /// Create a client backed by reqwest
    pub fn new(config: FetchConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: FetchConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let pacer = DomainPacer::new(config.min_interval);
        Self {
            config,
            transport,
            pacer,
            agent_cursor: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort waits and in-flight requests when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.fetch(FetchRequest::get(url)).await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<FetchResponse, FetchError> {
        self.fetch(FetchRequest::post_json(url, body)).await
    }

    /// Execute a request with pacing, retries and cancellation
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let (url, domain) = resolve_url(&request)?;
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let max_attempts = self.config.max_attempts.max(1);

        let mut attempts: Vec<FetchAttempt> = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let backoff = if attempt > 1 {
                let delay = self.jittered_backoff(attempt - 1);
                tracing::warn!(
                    "{} failed ({}), backing off for {:?} (attempt {}/{})",
                    domain,
                    last_error,
                    delay,
                    attempt,
                    max_attempts
                );
                self.sleep_or_cancel(delay).await?;
                delay
            } else {
                Duration::ZERO
            };

            self.pacer.wait(&domain, &self.cancel).await?;

            let transport_request = TransportRequest {
                method: request.method,
                url: url.clone(),
                headers: self.headers_for(&request),
                body: request.body.clone(),
                timeout,
            };

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                r = tokio::time::timeout(timeout, self.transport.send(transport_request)) => r,
            };

            let outcome = match result {
                Err(_) => {
                    last_error = format!("timed out after {:?}", timeout);
                    AttemptOutcome::Timeout
                }
                Ok(Err(e)) if e.is_retryable() => {
                    last_error = e.to_string();
                    match e {
                        TransportError::Timeout => AttemptOutcome::Timeout,
                        other => AttemptOutcome::Transport(other.to_string()),
                    }
                }
                Ok(Err(TransportError::Dns(message))) => {
                    tracing::debug!("DNS failure for {}: {}", domain, message);
                    return Err(FetchError::Dns { domain, message });
                }
                Ok(Err(e)) => {
                    return Err(FetchError::InvalidUrl {
                        url,
                        reason: e.to_string(),
                    });
                }
                Ok(Ok(TransportResponse { status, body })) => {
                    if (200..300).contains(&status) {
                        attempts.push(FetchAttempt {
                            domain: domain.clone(),
                            attempt,
                            backoff,
                            outcome: AttemptOutcome::Success(status),
                        });
                        tracing::debug!(
                            "Fetched {} (HTTP {}, {} attempt(s))",
                            url,
                            status,
                            attempt
                        );
                        return Ok(FetchResponse {
                            status,
                            body,
                            attempts,
                        });
                    }
                    if !is_retryable_status(status) {
                        return Err(FetchError::HttpStatus { url, status });
                    }
                    last_error = format!("HTTP {}", status);
                    AttemptOutcome::HttpStatus(status)
                }
            };

            attempts.push(FetchAttempt {
                domain: domain.clone(),
                attempt,
                backoff,
                outcome,
            });
        }

        Err(FetchError::RetriesExhausted {
            url,
            attempts: max_attempts,
            last_error,
        })
    }

    fn jittered_backoff(&self, retry: u32) -> Duration {
        let base = self.config.backoff_for(retry);
        let ratio = self.config.jitter_ratio.max(0.0);
        if ratio == 0.0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=ratio);
        self.config.capped(base.as_secs_f64() * (1.0 + jitter))
    }

    async fn sleep_or_cancel(&self, delay: Duration) -> Result<(), FetchError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn next_user_agent(&self) -> Option<&str> {
        if self.config.user_agents.is_empty() {
            return None;
        }
        let index = self.agent_cursor.fetch_add(1, Ordering::Relaxed) % self.config.user_agents.len();
        Some(self.config.user_agents[index].as_str())
    }

    fn headers_for(&self, request: &FetchRequest) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(request.headers.len() + 1);
        let caller_sets_agent = request
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("user-agent"));
        if !caller_sets_agent {
            if let Some(agent) = self.next_user_agent() {
                headers.push(("User-Agent".to_string(), agent.to_string()));
            }
        }
        headers.extend(request.headers.iter().cloned());
        headers
    }
}

/// Parse the URL, apply query parameters and extract the pacing domain
fn resolve_url(request: &FetchRequest) -> Result<(String, String), FetchError> {
    let mut url = Url::parse(request.url.trim()).map_err(|e| FetchError::InvalidUrl {
        url: request.url.clone(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl {
            url: request.url.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    let domain = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => {
            return Err(FetchError::InvalidUrl {
                url: request.url.clone(),
                reason: "missing host".to_string(),
            })
        }
    };

    if !request.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &request.query {
            pairs.append_pair(key, value);
        }
    }

    Ok((url.to_string(), domain))
}
