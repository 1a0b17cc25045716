//! Pearson correlation over the merged table
//!
//! Candidate columns are intersected with the merged table, incomplete rows
//! are dropped, and constant columns are removed before the matrix is built.
//! The matrix is symmetric with a unit diagonal, and every unordered pair is
//! ranked by absolute coefficient.

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::merge::MergedTable;
use crate::types::{NoticeKind, Notices};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Square correlation matrix over `columns`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// Row-major coefficients; `values[i][j] == values[j][i]`
    pub values: Vec<Vec<f64>>,
    /// Complete rows the coefficients were computed from
    pub observations: usize,
}

impl CorrelationMatrix {
    /// Coefficient between two columns
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[i][j])
    }
}

/// One unordered column pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub first: String,
    pub second: String,
    pub coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub matrix: CorrelationMatrix,
    /// All pairs, strongest absolute coefficient first
    pub ranked_pairs: Vec<CorrelationPair>,
}

/// Correlation analyzer
pub struct CorrelationAnalyzer {
    candidates: Vec<String>,
    min_rows: usize,
    min_columns: usize,
}

impl CorrelationAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            candidates: config.correlation_candidates.clone(),
            min_rows: config.min_correlation_rows,
            min_columns: config.min_correlation_columns,
        }
    }

    pub fn analyze(&self, merged: &MergedTable, notices: &mut Notices) -> Result<CorrelationResult> {
        let mut seen = HashSet::new();
        let columns: Vec<String> = self
            .candidates
            .iter()
            .filter(|c| merged.has_column(c) && seen.insert(c.as_str()))
            .cloned()
            .collect();
        self.check_columns(columns.len())?;

        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| merged.column_index(c))
            .collect();

        // column-major data over complete rows only
        let mut data: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
        for row in &merged.rows {
            let values: Option<Vec<f64>> = indices.iter().map(|&i| row.values[i]).collect();
            if let Some(values) = values {
                for (k, v) in values.into_iter().enumerate() {
                    data[k].push(v);
                }
            }
        }

        let observations = data.first().map_or(0, |c| c.len());
        if observations < self.min_rows {
            return Err(AnalysisError::insufficient(format!(
                "need at least {} complete rows for correlation, got {}",
                self.min_rows, observations
            )));
        }

        let (constant, varying): (Vec<_>, Vec<_>) = columns
            .into_iter()
            .zip(data)
            .partition(|(_, values)| is_constant(values));
        if !constant.is_empty() {
            let names: Vec<&str> = constant.iter().map(|(c, _)| c.as_str()).collect();
            notices.push(
                NoticeKind::InsufficientData,
                None,
                format!("constant columns excluded from correlation: {}", names.join(", ")),
            );
        }
        self.check_columns(varying.len())?;

        let (columns, data): (Vec<String>, Vec<Vec<f64>>) = varying.into_iter().unzip();
        let n = columns.len();
        let mut values = vec![vec![0.0; n]; n];
        for i in 0..n {
            values[i][i] = 1.0;
            for j in (i + 1)..n {
                let r = pearson(&data[i], &data[j]).unwrap_or(0.0);
                values[i][j] = r;
                values[j][i] = r;
            }
        }

        let mut ranked_pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                ranked_pairs.push(CorrelationPair {
                    first: columns[i].clone(),
                    second: columns[j].clone(),
                    coefficient: values[i][j],
                });
            }
        }
        // stable, so ties keep matrix order
        ranked_pairs.sort_by(|a, b| b.coefficient.abs().total_cmp(&a.coefficient.abs()));

        tracing::info!(columns = n, observations, "computed correlation matrix");

        Ok(CorrelationResult {
            matrix: CorrelationMatrix {
                columns,
                values,
                observations,
            },
            ranked_pairs,
        })
    }

    fn check_columns(&self, count: usize) -> Result<()> {
        if count < self.min_columns {
            return Err(AnalysisError::insufficient(format!(
                "need at least {} correlation columns, got {}",
                self.min_columns, count
            )));
        }
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Every value equal to the first; the mean of repeated values need not round-trip
fn is_constant(values: &[f64]) -> bool {
    values.iter().all(|v| *v == values[0])
}

/// Pearson correlation coefficient; `None` for mismatched, short, or constant inputs
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    if is_constant(x) || is_constant(y) {
        return None;
    }

    let (mx, my) = (mean(x), mean(y));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}
