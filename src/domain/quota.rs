//! Quota Ledger
//!
//! Per-source call budgets with daily or monthly caps. Rollover is lazy:
//! every reservation compares "now" with the stored period start and resets
//! the counter when a new period has begun. A reservation at the cap is
//! refused, never allowed through.

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ports::quota_store::{PersistError, QuotaStore};

/// Default alert ratio for monthly budgets
pub const DEFAULT_MONTHLY_ALERT_RATIO: f64 = 0.8;

/// Default alert ratio for daily budgets
pub const DEFAULT_DAILY_ALERT_RATIO: f64 = 0.9;

/// Budget period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Daily,
    Monthly,
}

impl QuotaPeriod {
    /// Start of the period containing `now` (UTC midnight, or the 1st of the month)
    pub fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = now.date_naive();
        let date = match self {
            QuotaPeriod::Daily => date,
            QuotaPeriod::Monthly => date.with_day(1).unwrap_or(date),
        };
        Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
    }
}

impl fmt::Display for QuotaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaPeriod::Daily => write!(f, "daily"),
            QuotaPeriod::Monthly => write!(f, "monthly"),
        }
    }
}

/// Configured budget for one source
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuotaLimit {
    pub source: String,
    pub period: QuotaPeriod,
    /// `None` means unlimited
    #[serde(default)]
    pub cap: Option<u64>,
}

impl QuotaLimit {
    pub fn new(source: impl Into<String>, period: QuotaPeriod, cap: Option<u64>) -> Self {
        Self {
            source: source.into(),
            period,
            cap,
        }
    }
}

/// Durable counter state for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaState {
    pub period: QuotaPeriod,
    pub used: u64,
    pub period_start: DateTime<Utc>,
    pub cap: Option<u64>,
}

impl QuotaState {
    pub fn new(period: QuotaPeriod, cap: Option<u64>, now: DateTime<Utc>) -> Self {
        Self {
            period,
            used: 0,
            period_start: period.period_start(now),
            cap,
        }
    }

    /// Reset the counter if `now` is in a later period. Returns the count
    /// that was discarded.
    fn roll_over(&mut self, now: DateTime<Utc>) -> Option<u64> {
        let current = self.period.period_start(now);
        if current > self.period_start {
            let old = self.used;
            self.used = 0;
            self.period_start = current;
            Some(old)
        } else {
            None
        }
    }

    fn has_room(&self) -> bool {
        self.cap.map_or(true, |cap| self.used < cap)
    }

    pub fn remaining(&self) -> Option<u64> {
        self.cap.map(|cap| cap.saturating_sub(self.used))
    }
}

/// Read-only view of a source's budget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    pub source: String,
    pub used: u64,
    pub cap: Option<u64>,
    pub period: QuotaPeriod,
    pub period_start: DateTime<Utc>,
}

impl QuotaStatus {
    /// Fraction of the cap consumed; `None` for unlimited sources
    pub fn usage_ratio(&self) -> Option<f64> {
        match self.cap {
            Some(0) => Some(1.0),
            Some(cap) => Some(self.used as f64 / cap as f64),
            None => None,
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        self.cap.map(|cap| cap.saturating_sub(self.used))
    }

    /// True when the most recent reservation moved usage across `ratio`
    pub fn crossed_threshold(&self, ratio: f64) -> bool {
        match self.cap {
            Some(cap) if cap > 0 && self.used > 0 => {
                let before = (self.used - 1) as f64 / cap as f64;
                let after = self.used as f64 / cap as f64;
                before < ratio && after >= ratio
            }
            _ => false,
        }
    }
}

impl fmt::Display for QuotaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let window = match self.period {
            QuotaPeriod::Daily => "today",
            QuotaPeriod::Monthly => "this month",
        };
        match self.cap {
            Some(cap) => write!(f, "{}: {}/{} {}", self.source, self.used, cap, window),
            None => write!(f, "{}: {} {} (unlimited)", self.source, self.used, window),
        }
    }
}

/// Shared, durable per-source call budget
pub struct QuotaLedger {
    states: Mutex<BTreeMap<String, QuotaState>>,
    configured: HashSet<String>,
    store: Arc<dyn QuotaStore>,
}

impl fmt::Debug for QuotaLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaLedger")
            .field("sources", &self.configured)
            .finish()
    }
}

impl QuotaLedger {
    /// Load persisted state and reconcile it with the configured limits
    pub fn open(store: Arc<dyn QuotaStore>, limits: &[QuotaLimit]) -> Result<Self, PersistError> {
        Self::open_at(store, limits, Utc::now())
    }

    pub fn open_at(
        store: Arc<dyn QuotaStore>,
        limits: &[QuotaLimit],
        now: DateTime<Utc>,
    ) -> Result<Self, PersistError> {
        let mut states = store.load()?;
        let mut configured = HashSet::with_capacity(limits.len());
        let mut changed = false;

        for limit in limits {
            configured.insert(limit.source.clone());
            match states.get_mut(&limit.source) {
                Some(state) if state.period == limit.period => {
                    if state.cap != limit.cap {
                        tracing::info!(
                            "Quota cap for {} changed: {:?} -> {:?}",
                            limit.source,
                            state.cap,
                            limit.cap
                        );
                        state.cap = limit.cap;
                        changed = true;
                    }
                }
                Some(state) => {
                    tracing::info!(
                        "Quota period for {} changed to {}, counter restarted",
                        limit.source,
                        limit.period
                    );
                    *state = QuotaState::new(limit.period, limit.cap, now);
                    changed = true;
                }
                None => {
                    states.insert(
                        limit.source.clone(),
                        QuotaState::new(limit.period, limit.cap, now),
                    );
                    changed = true;
                }
            }
        }

        // Opening an already reconciled ledger leaves the store untouched
        if changed {
            store.save(&states)?;
        }

        Ok(Self {
            states: Mutex::new(states),
            configured,
            store,
        })
    }

    /// Atomically check the cap and claim one call for `source`
    pub fn reserve(&self, source: &str) -> bool {
        self.reserve_at(source, Utc::now())
    }

    pub fn reserve_at(&self, source: &str, now: DateTime<Utc>) -> bool {
        if !self.configured.contains(source) {
            tracing::warn!("Quota reservation for unknown source '{}' refused", source);
            return false;
        }

        let mut states = self.lock();
        let Some(state) = states.get_mut(source) else {
            return false;
        };

        let reset = state.roll_over(now);
        if let Some(old) = reset {
            tracing::info!(
                "{} quota reset for new {} period (was {}/{:?})",
                source,
                state.period,
                old,
                state.cap
            );
        }

        if !state.has_room() {
            if reset.is_some() {
                self.persist(&states);
            }
            return false;
        }

        state.used += 1;
        tracing::debug!(
            "{} quota: {} used, {:?} remaining",
            source,
            state.used,
            state.remaining()
        );
        self.persist(&states);
        true
    }

    /// Current usage for a source, with any pending rollover projected
    pub fn status(&self, source: &str) -> Option<QuotaStatus> {
        self.status_at(source, Utc::now())
    }

    pub fn status_at(&self, source: &str, now: DateTime<Utc>) -> Option<QuotaStatus> {
        let states = self.lock();
        states
            .get(source)
            .filter(|_| self.configured.contains(source))
            .map(|state| project(source, state, now))
    }

    /// Usage for every configured source, sorted by name
    pub fn statuses(&self) -> Vec<QuotaStatus> {
        let now = Utc::now();
        let states = self.lock();
        states
            .iter()
            .filter(|(source, _)| self.configured.contains(source.as_str()))
            .map(|(source, state)| project(source, state, now))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, QuotaState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, states: &BTreeMap<String, QuotaState>) {
        if let Err(e) = self.store.save(states) {
            tracing::error!("Failed to persist quota ledger: {}", e);
        }
    }
}

fn project(source: &str, state: &QuotaState, now: DateTime<Utc>) -> QuotaStatus {
    let mut view = state.clone();
    view.roll_over(now);
    QuotaStatus {
        source: source.to_string(),
        used: view.used,
        cap: view.cap,
        period: view.period,
        period_start: view.period_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryQuotaStore;
    use chrono::Duration;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn ledger(limits: &[QuotaLimit], now: DateTime<Utc>) -> (QuotaLedger, Arc<MemoryQuotaStore>) {
        let store = Arc::new(MemoryQuotaStore::new());
        let ledger = QuotaLedger::open_at(store.clone(), limits, now).unwrap();
        (ledger, store)
    }

    #[test]
    fn test_period_start() {
        let now = at(2026, 3, 17, 15);
        assert_eq!(QuotaPeriod::Daily.period_start(now), at(2026, 3, 17, 0));
        assert_eq!(QuotaPeriod::Monthly.period_start(now), at(2026, 3, 1, 0));
    }

    #[test]
    fn test_reserve_never_exceeds_cap() {
        let now = at(2026, 3, 17, 10);
        let (ledger, _) = ledger(&[QuotaLimit::new("hunter", QuotaPeriod::Monthly, Some(3))], now);

        let results: Vec<bool> = (0..6).map(|_| ledger.reserve_at("hunter", now)).collect();
        assert_eq!(results, vec![true, true, true, false, false, false]);

        let status = ledger.status_at("hunter", now).unwrap();
        assert_eq!(status.used, 3);
        assert_eq!(status.remaining(), Some(0));
    }

    #[test]
    fn test_refusal_does_not_mutate() {
        let now = at(2026, 3, 17, 10);
        let (ledger, store) = ledger(&[QuotaLimit::new("x", QuotaPeriod::Daily, Some(0))], now);
        let before = store.snapshot();
        assert!(!ledger.reserve_at("x", now));
        assert_eq!(store.snapshot(), before);
        assert_eq!(ledger.status_at("x", now).unwrap().used, 0);
    }

    #[test]
    fn test_daily_rollover_after_boundary() {
        let day1 = at(2026, 3, 17, 23);
        let (ledger, _) = ledger(&[QuotaLimit::new("yelp", QuotaPeriod::Daily, Some(2))], day1);
        assert!(ledger.reserve_at("yelp", day1));
        assert!(ledger.reserve_at("yelp", day1));
        assert!(!ledger.reserve_at("yelp", day1));

        let day2 = at(2026, 3, 18, 0) + Duration::seconds(1);
        assert!(ledger.reserve_at("yelp", day2));
        assert_eq!(ledger.status_at("yelp", day2).unwrap().used, 1);
    }

    #[test]
    fn test_rollover_after_long_idle() {
        let start = at(2026, 1, 5, 9);
        let (ledger, _) = ledger(&[QuotaLimit::new("places", QuotaPeriod::Monthly, Some(1))], start);
        assert!(ledger.reserve_at("places", start));
        assert!(!ledger.reserve_at("places", start));

        let much_later = at(2026, 9, 20, 9);
        assert!(ledger.reserve_at("places", much_later));
        let status = ledger.status_at("places", much_later).unwrap();
        assert_eq!(status.used, 1);
        assert_eq!(status.period_start, at(2026, 9, 1, 0));
    }

    #[test]
    fn test_clock_going_backwards_does_not_reset() {
        let now = at(2026, 3, 17, 10);
        let (ledger, _) = ledger(&[QuotaLimit::new("x", QuotaPeriod::Daily, Some(1))], now);
        assert!(ledger.reserve_at("x", now));
        assert!(!ledger.reserve_at("x", at(2026, 3, 16, 10)));
    }

    #[test]
    fn test_status_projects_rollover_without_writing() {
        let now = at(2026, 3, 17, 10);
        let (ledger, store) = ledger(&[QuotaLimit::new("x", QuotaPeriod::Daily, Some(5))], now);
        ledger.reserve_at("x", now);
        let tomorrow = at(2026, 3, 18, 10);
        assert_eq!(ledger.status_at("x", tomorrow).unwrap().used, 0);
        assert_eq!(store.snapshot()["x"].used, 1);
    }

    #[test]
    fn test_unknown_source_refused() {
        let now = at(2026, 3, 17, 10);
        let (ledger, _) = ledger(&[], now);
        assert!(!ledger.reserve_at("mystery", now));
        assert!(ledger.status_at("mystery", now).is_none());
    }

    #[test]
    fn test_unlimited_source() {
        let now = at(2026, 3, 17, 10);
        let (ledger, _) = ledger(&[QuotaLimit::new("website", QuotaPeriod::Daily, None)], now);
        for _ in 0..100 {
            assert!(ledger.reserve_at("website", now));
        }
        let status = ledger.status_at("website", now).unwrap();
        assert_eq!(status.usage_ratio(), None);
        assert!(!status.crossed_threshold(0.8));
    }

    #[test]
    fn test_reopen_reconciles_config() {
        let now = at(2026, 3, 17, 10);
        let store = Arc::new(MemoryQuotaStore::new());
        {
            let ledger = QuotaLedger::open_at(
                store.clone(),
                &[QuotaLimit::new("hunter", QuotaPeriod::Monthly, Some(25))],
                now,
            )
            .unwrap();
            for _ in 0..4 {
                ledger.reserve_at("hunter", now);
            }
        }

        let reopened = QuotaLedger::open_at(
            store.clone(),
            &[QuotaLimit::new("hunter", QuotaPeriod::Monthly, Some(5))],
            now,
        )
        .unwrap();
        let status = reopened.status_at("hunter", now).unwrap();
        assert_eq!(status.used, 4);
        assert_eq!(status.cap, Some(5));
        assert!(reopened.reserve_at("hunter", now));
        assert!(!reopened.reserve_at("hunter", now));

        let switched = QuotaLedger::open_at(
            store,
            &[QuotaLimit::new("hunter", QuotaPeriod::Daily, Some(5))],
            now,
        )
        .unwrap();
        assert_eq!(switched.status_at("hunter", now).unwrap().used, 0);
    }

    /// Store that counts how often it is written
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryQuotaStore,
        saves: std::sync::atomic::AtomicUsize,
    }

    impl QuotaStore for CountingStore {
        fn load(&self) -> Result<BTreeMap<String, QuotaState>, PersistError> {
            self.inner.load()
        }

        fn save(&self, states: &BTreeMap<String, QuotaState>) -> Result<(), PersistError> {
            self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.save(states)
        }
    }

    #[test]
    fn test_reopen_without_changes_does_not_write() {
        let now = at(2026, 3, 17, 10);
        let store = Arc::new(CountingStore::default());
        let limits = [QuotaLimit::new("yelp", QuotaPeriod::Daily, Some(500))];

        QuotaLedger::open_at(store.clone(), &limits, now).unwrap();
        assert_eq!(store.saves.load(std::sync::atomic::Ordering::SeqCst), 1);

        // Read-only inspection, even in a later period, never rewrites the file
        let later = at(2026, 3, 18, 10);
        let ledger = QuotaLedger::open_at(store.clone(), &limits, later).unwrap();
        assert_eq!(ledger.statuses().len(), 1);
        assert_eq!(store.saves.load(std::sync::atomic::Ordering::SeqCst), 1);

        let raised = [QuotaLimit::new("yelp", QuotaPeriod::Daily, Some(600))];
        QuotaLedger::open_at(store.clone(), &raised, later).unwrap();
        assert_eq!(store.saves.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_threshold_crossing_fires_once() {
        let now = at(2026, 3, 17, 10);
        let (ledger, _) = ledger(&[QuotaLimit::new("x", QuotaPeriod::Monthly, Some(10))], now);
        let mut crossings = 0;
        for _ in 0..10 {
            ledger.reserve_at("x", now);
            if ledger.status_at("x", now).unwrap().crossed_threshold(0.8) {
                crossings += 1;
            }
        }
        assert_eq!(crossings, 1);
    }

    #[test]
    fn test_concurrent_reservations_respect_cap() {
        let now = at(2026, 3, 17, 10);
        let (ledger, _) = ledger(&[QuotaLimit::new("x", QuotaPeriod::Daily, Some(50))], now);
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || (0..20).filter(|_| ledger.reserve_at("x", now)).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(granted, 50);
        assert_eq!(ledger.status_at("x", now).unwrap().used, 50);
    }
}
