//! JSON Quota Store
//!
//! Persists the quota ledger as pretty-printed JSON. Writes go to a sibling
//! temp file first and are renamed into place so a crash mid-write never
//! leaves a truncated ledger behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::domain::quota::QuotaState;
use crate::ports::quota_store::{PersistError, QuotaStore};

/// Default ledger file name
pub const DEFAULT_LEDGER_FILE: &str = "api_usage.json";

/// File-backed quota store
#[derive(Debug, Clone)]
pub struct JsonQuotaStore {
    path: PathBuf,
}

impl JsonQuotaStore {
    /// Create a store at `path`; `~` is expanded to the home directory
    pub fn new(path: impl AsRef<str>) -> Self {
        let expanded = shellexpand::tilde(path.as_ref()).to_string();
        Self {
            path: PathBuf::from(expanded),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_LEDGER_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl QuotaStore for JsonQuotaStore {
    fn load(&self) -> Result<BTreeMap<String, QuotaState>, PersistError> {
        if !self.path.exists() {
            tracing::info!(
                "No quota ledger at {}, starting fresh",
                self.path.display()
            );
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| PersistError::ReadError(e.to_string()))?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let states: BTreeMap<String, QuotaState> = serde_json::from_str(&content)
            .map_err(|e| PersistError::CorruptedFile(format!("{}: {}", self.path.display(), e)))?;

        tracing::debug!(
            "Loaded quota ledger from {} ({} sources)",
            self.path.display(),
            states.len()
        );
        Ok(states)
    }

    fn save(&self, states: &BTreeMap<String, QuotaState>) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| PersistError::DirectoryError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(states)
            .map_err(|e| PersistError::SerializationError(e.to_string()))?;

        let tmp = self.temp_path();
        fs::write(&tmp, content).map_err(|e| PersistError::WriteError(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| PersistError::WriteError(e.to_string()))?;

        Ok(())
    }
}

/// In-memory quota store
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    states: Mutex<BTreeMap<String, QuotaState>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the last saved state
    pub fn snapshot(&self) -> BTreeMap<String, QuotaState> {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl QuotaStore for MemoryQuotaStore {
    fn load(&self) -> Result<BTreeMap<String, QuotaState>, PersistError> {
        Ok(self.snapshot())
    }

    fn save(&self, states: &BTreeMap<String, QuotaState>) -> Result<(), PersistError> {
        *self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = states.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quota::QuotaPeriod;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample() -> BTreeMap<String, QuotaState> {
        let now = Utc.with_ymd_and_hms(2026, 3, 17, 10, 30, 0).unwrap();
        let mut states = BTreeMap::new();
        states.insert(
            "hunter".to_string(),
            QuotaState {
                period: QuotaPeriod::Monthly,
                used: 7,
                period_start: QuotaPeriod::Monthly.period_start(now),
                cap: Some(25),
            },
        );
        states.insert(
            "website".to_string(),
            QuotaState {
                period: QuotaPeriod::Daily,
                used: 112,
                period_start: now,
                cap: None,
            },
        );
        states
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonQuotaStore::new(dir.path().join("nested/usage.json").to_string_lossy());

        store.save(&sample()).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, sample());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonQuotaStore::new(dir.path().join("absent.json").to_string_lossy());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonQuotaStore::new(path.to_string_lossy());
        assert!(matches!(store.load(), Err(PersistError::CorruptedFile(_))));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryQuotaStore::new();
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }
}
