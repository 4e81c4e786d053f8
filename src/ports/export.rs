//! Export port

use thiserror::Error;

use crate::domain::lead::Lead;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Failed to serialize leads: {0}")]
    SerializationError(String),

    #[error("Failed to write export: {0}")]
    WriteError(String),

    #[error("Lead '{0}' reached export without a score")]
    Unscored(String),
}

/// Where an export landed
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub destination: String,
    pub count: usize,
}

/// Hands scored leads to their destination
pub trait LeadExporter: Send + Sync {
    fn export(&self, leads: &[Lead]) -> Result<ExportSummary, ExportError>;
}
