//! Quota persistence port
//!
//! The ledger keeps its counters across process restarts through this trait.
//! Implementations must round-trip (period, used, period_start, cap) exactly.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::quota::QuotaState;

#[derive(Error, Debug, Clone)]
pub enum PersistError {
    #[error("Failed to serialize quota ledger: {0}")]
    SerializationError(String),

    #[error("Failed to write quota ledger: {0}")]
    WriteError(String),

    #[error("Failed to read quota ledger: {0}")]
    ReadError(String),

    #[error("Quota ledger file is corrupted: {0}")]
    CorruptedFile(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

/// Durable storage for quota state, keyed by source name
pub trait QuotaStore: Send + Sync {
    /// Load every persisted source; an absent store loads as empty
    fn load(&self) -> Result<BTreeMap<String, QuotaState>, PersistError>;

    /// Replace the persisted state with `states`
    fn save(&self, states: &BTreeMap<String, QuotaState>) -> Result<(), PersistError>;
}
