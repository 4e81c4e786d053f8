//! CSV lead export
//!
//! One row per lead in a flat column layout that opens cleanly in a
//! spreadsheet. List values are joined into a single cell.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::lead::{Lead, Tier};
use crate::ports::export::{ExportError, ExportSummary, LeadExporter};

/// Column order of the exported sheet
pub const CSV_COLUMNS: &[&str] = &[
    "name", "city", "region", "phone", "website", "email", "other_emails", "score", "tier",
    "sources", "notes",
];

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    name: &'a str,
    city: &'a str,
    region: &'a str,
    phone: &'a str,
    website: &'a str,
    email: &'a str,
    other_emails: String,
    score: String,
    tier: String,
    sources: String,
    notes: String,
}

impl<'a> CsvRow<'a> {
    fn from_lead(lead: &'a Lead) -> Self {
        let emails = lead.emails();
        Self {
            name: &lead.name,
            city: lead.city.as_deref().unwrap_or_default(),
            region: lead.region.as_deref().unwrap_or_default(),
            phone: lead.phone.as_deref().unwrap_or_default(),
            website: lead.real_website().unwrap_or_default(),
            email: emails.first().map(String::as_str).unwrap_or_default(),
            other_emails: emails.iter().skip(1).cloned().collect::<Vec<_>>().join("; "),
            score: format!("{:.1}", lead.score),
            tier: lead.tier.to_string(),
            sources: lead.provenance().join("; "),
            notes: lead.notes.join(" | "),
        }
    }
}

/// Writes scored leads to one CSV file with a header row
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
}

impl CsvExporter {
    /// `~` in `path` is expanded to the home directory
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: PathBuf::from(shellexpand::tilde(path.as_ref()).to_string()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_rows(&self, target: &Path, leads: &[Lead]) -> Result<(), ExportError> {
        let mut writer =
            csv::Writer::from_path(target).map_err(|e| ExportError::WriteError(e.to_string()))?;
        for lead in leads {
            writer
                .serialize(CsvRow::from_lead(lead))
                .map_err(|e| ExportError::SerializationError(e.to_string()))?;
        }
        writer.flush().map_err(|e| ExportError::WriteError(e.to_string()))
    }
}

impl LeadExporter for CsvExporter {
    fn export(&self, leads: &[Lead]) -> Result<ExportSummary, ExportError> {
        if let Some(lead) = leads.iter().find(|l| l.tier == Tier::Unscored) {
            return Err(ExportError::Unscored(lead.name.clone()));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ExportError::WriteError(e.to_string()))?;
        }
        let temp = self.path.with_extension("csv.tmp");
        if let Err(e) = self.write_rows(&temp, leads) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        fs::rename(&temp, &self.path).map_err(|e| ExportError::WriteError(e.to_string()))?;

        tracing::info!("Exported {} leads to {}", leads.len(), self.path.display());
        Ok(ExportSummary {
            destination: self.path.display().to_string(),
            count: leads.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lead::{signals, PartialLead};
    use tempfile::TempDir;

    fn scored(partial: PartialLead, score: f64, tier: Tier) -> Lead {
        let mut lead = Lead::from_partial(partial, "google_places");
        lead.set_score(score, tier);
        lead
    }

    #[test]
    fn test_writes_rows_that_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/leads.csv");
        let exporter = CsvExporter::new(path.to_str().unwrap());

        let mut rich = scored(
            PartialLead::new("Milton Heating, Cooling & Air")
                .with_location("Milton", "ON")
                .with_phone("+1-905-555-0199")
                .with_website("https://miltonheating.ca")
                .with_signal(
                    signals::EMAILS,
                    vec!["info@miltonheating.ca".to_string(), "sales@miltonheating.ca".to_string()],
                ),
            77.0,
            Tier::A,
        );
        rich.add_provenance("website");
        rich.add_note("Booking widget: \"Book now\"");
        let bare = scored(
            PartialLead::new("Halton Air").with_website("https://www.yelp.com/biz/halton-air"),
            20.0,
            Tier::C,
        );

        let summary = exporter.export(&[rich, bare]).unwrap();
        assert_eq!(summary.count, 2);
        assert!(!path.with_extension("csv.tmp").exists());

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, CSV_COLUMNS);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        let first = &rows[0];
        assert_eq!(&first[0], "Milton Heating, Cooling & Air");
        assert_eq!(&first[3], "+1-905-555-0199");
        assert_eq!(&first[4], "https://miltonheating.ca");
        assert_eq!(&first[5], "info@miltonheating.ca");
        assert_eq!(&first[6], "sales@miltonheating.ca");
        assert_eq!(&first[7], "77.0");
        assert_eq!(&first[8], "A");
        assert_eq!(&first[9], "google_places; website");
        assert!(first[10].contains("\"Book now\""));

        // Directory listings are not exported as the business's website
        assert_eq!(&rows[1][4], "");
        assert_eq!(&rows[1][8], "C");
    }

    #[test]
    fn test_refuses_unscored_leads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leads.csv");
        let exporter = CsvExporter::new(path.to_str().unwrap());

        let leads = vec![Lead::from_partial(PartialLead::new("Raw"), "yelp")];
        assert_eq!(exporter.export(&leads), Err(ExportError::Unscored("Raw".into())));
        assert!(!path.exists());
    }
}
