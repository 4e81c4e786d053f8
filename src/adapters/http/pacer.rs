//! Per-domain request pacing
//!
//! Each domain keeps the instant of its last claimed slot. A caller claims
//! `max(now, last + interval)` under the lock and sleeps after releasing it,
//! so concurrent callers to the same domain are spaced out in claim order.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::FetchError;

#[derive(Debug)]
pub struct DomainPacer {
    min_interval: Duration,
    slots: Mutex<HashMap<String, Instant>>,
}

impl DomainPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Reserve the next send slot for `domain`
    pub async fn claim(&self, domain: &str) -> Instant {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        let slot = match slots.get(domain) {
            Some(last) => (*last + self.min_interval).max(now),
            None => now,
        };
        slots.insert(domain.to_string(), slot);
        slot
    }

    /// Claim a slot and wait for it; returns how long the caller waited
    pub async fn wait(&self, domain: &str, cancel: &CancellationToken) -> Result<Duration, FetchError> {
        let slot = self.claim(domain).await;
        let delay = slot.saturating_duration_since(Instant::now());
        if delay.is_zero() {
            return Ok(delay);
        }

        tracing::trace!("Pacing {} for {:?}", domain, delay);
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep_until(slot) => Ok(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slots_are_spaced_per_domain() {
        let pacer = DomainPacer::new(Duration::from_millis(50));
        let a1 = pacer.claim("a.com").await;
        let a2 = pacer.claim("a.com").await;
        let a3 = pacer.claim("a.com").await;
        let b1 = pacer.claim("b.com").await;

        assert!(a2.duration_since(a1) >= Duration::from_millis(50));
        assert!(a3.duration_since(a2) >= Duration::from_millis(50));
        // Other domains are not held back
        assert!(b1 < a2);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_serialize() {
        let pacer = std::sync::Arc::new(DomainPacer::new(Duration::from_millis(30)));
        let cancel = CancellationToken::new();
        let start = std::time::Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let pacer = pacer.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { pacer.wait("a.com", &cancel).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_cancelled_wait() {
        let pacer = DomainPacer::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        pacer.wait("a.com", &cancel).await.unwrap();

        cancel.cancel();
        let result = pacer.wait("a.com", &cancel).await;
        assert_eq!(result, Err(FetchError::Cancelled));
    }
}
