//! Error types for Garmin Flux

use crate::types::Domain;
use thiserror::Error;

/// Errors that can occur while analyzing an export
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No files found for domain: {0}")]
    MissingDomain(Domain),

    #[error("Failed to parse export data: {0}")]
    Parse(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    /// Create an archive error from a message
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a parse error from a message
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an insufficient data error from a message
    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    /// Whether this error aborts the whole session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Archive(_))
    }
}

impl From<zip::result::ZipError> for AnalysisError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}
