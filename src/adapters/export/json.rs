//! JSON lead export

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::lead::{Lead, Tier};
use crate::ports::export::{ExportError, ExportSummary, LeadExporter};

pub const DEFAULT_EXPORT_FILE: &str = "leads.json";

#[derive(Debug, Serialize)]
struct ExportDocument<'a> {
    generated_at: DateTime<Utc>,
    count: usize,
    tier_counts: TierCounts,
    leads: &'a [Lead],
}

#[derive(Debug, Default, Serialize)]
struct TierCounts {
    a: usize,
    b: usize,
    c: usize,
}

/// Writes scored leads to one pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonExporter {
    path: PathBuf,
}

impl JsonExporter {
    /// `~` in `path` is expanded to the home directory
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: PathBuf::from(shellexpand::tilde(path.as_ref()).to_string()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LeadExporter for JsonExporter {
    fn export(&self, leads: &[Lead]) -> Result<ExportSummary, ExportError> {
        let mut tier_counts = TierCounts::default();
        for lead in leads {
            match lead.tier {
                Tier::A => tier_counts.a += 1,
                Tier::B => tier_counts.b += 1,
                Tier::C => tier_counts.c += 1,
                Tier::Unscored => return Err(ExportError::Unscored(lead.name.clone())),
            }
        }

        let document = ExportDocument {
            generated_at: Utc::now(),
            count: leads.len(),
            tier_counts,
            leads,
        };
        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| ExportError::SerializationError(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ExportError::WriteError(e.to_string()))?;
        }
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, content).map_err(|e| ExportError::WriteError(e.to_string()))?;
        fs::rename(&temp, &self.path).map_err(|e| ExportError::WriteError(e.to_string()))?;

        tracing::info!("Exported {} leads to {}", leads.len(), self.path.display());
        Ok(ExportSummary {
            destination: self.path.display().to_string(),
            count: leads.len(),
        })
    }
}
