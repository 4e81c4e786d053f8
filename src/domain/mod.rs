//! Domain Layer - Core lead acquisition logic
//!
//! Pure types and rules with no network access. Adapters reach the outside
//! world through the ports layer.
//!
//! - `lead`: lead record, signal vocabulary, provenance and merge rules
//! - `dedup`: duplicate detection and transitive merge
//! - `quota`: per-source call budgets with lazy period rollover
//! - `scoring`: weights table, score clamping and tiering

pub mod dedup;
pub mod lead;
pub mod quota;
pub mod scoring;

pub use dedup::{duplicate_reason, merge_duplicates, normalize_domain, DuplicateReason};
pub use lead::{is_placeholder_website, signals, Lead, PartialLead, ScoringStatus, SignalValue, Tier};
pub use quota::{QuotaLedger, QuotaLimit, QuotaPeriod, QuotaState, QuotaStatus};
pub use scoring::{
    Contribution, ScoreCard, ScoringEngine, ScoringError, SignalCondition, WeightRule, WeightsTable,
};
