//! Storage Adapters
//!
//! Quota ledger persistence: a JSON file for real runs and an in-memory
//! store for tests and dry runs.

mod json_store;

pub use json_store::{JsonQuotaStore, MemoryQuotaStore, DEFAULT_LEDGER_FILE};
