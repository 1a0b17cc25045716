//! Analyzer configuration

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Columns of the merged table considered for the correlation matrix
pub const DEFAULT_CORRELATION_CANDIDATES: &[&str] = &[
    "duration_minutes",
    "calories",
    "distance_km",
    "total_sleep_hours",
    "deep_sleep_hours",
    "bb_charged",
    "bb_drained",
    "stress_level",
    "hrv",
    "resting_hr",
];

/// How several rows sharing one calendar date collapse before the join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the last row in source order (files sorted by path, records in file order)
    #[default]
    KeepLast,
    /// Average every numeric column over the duplicates, ignoring nulls
    Mean,
    /// Leave the domain out of the merge
    Reject,
}

/// Tunables for one analysis session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Minimum merged days required before any cross-domain view is produced
    pub min_merged_rows: usize,
    /// Minimum complete rows for the correlation matrix
    pub min_correlation_rows: usize,
    /// Minimum columns for the correlation matrix
    pub min_correlation_columns: usize,
    /// Merged-table columns eligible for correlation, in matrix order
    pub correlation_candidates: Vec<String>,
    pub duplicate_policy: DuplicatePolicy,
    /// Number of strongest pairs described by the insight layer
    pub top_pairs: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_merged_rows: 5,
            min_correlation_rows: 3,
            min_correlation_columns: 3,
            correlation_candidates: DEFAULT_CORRELATION_CANDIDATES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            duplicate_policy: DuplicatePolicy::default(),
            top_pairs: 5,
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from JSON; absent keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_correlation_columns < 2 {
            return Err(AnalysisError::Config(
                "min_correlation_columns must be at least 2".to_string(),
            ));
        }
        if self.min_correlation_rows < 2 {
            return Err(AnalysisError::Config(
                "min_correlation_rows must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.min_merged_rows, 5);
        assert_eq!(config.min_correlation_rows, 3);
        assert_eq!(config.min_correlation_columns, 3);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::KeepLast);
        assert_eq!(config.correlation_candidates.len(), 10);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            AnalyzerConfig::from_json(r#"{"duplicate_policy": "mean", "min_merged_rows": 3}"#)
                .unwrap();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Mean);
        assert_eq!(config.min_merged_rows, 3);
        assert_eq!(config.top_pairs, 5);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = AnalyzerConfig::from_json(r#"{"min_correlation_columns": 1}"#);
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }
}
