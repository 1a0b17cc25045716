//! Domain loaders
//!
//! Each loader maps the raw JSON documents of one export domain into a
//! normalized, date-keyed table. Loaders are independent of one another; a
//! failing loader leaves its table absent and reports a notice instead of
//! failing the session.

mod activities;
mod body_battery;
mod health;
mod hydration;
mod sleep;

pub use activities::{ActivitiesLoader, ActivitiesTable, ActivityRow, UNKNOWN_ACTIVITY_TYPE};
pub use body_battery::{
    BodyBatteryLoader, BodyBatteryRow, BodyBatteryStat, BodyBatteryTable, StressRow, StressTable,
    TOTAL_SEGMENT,
};
pub use health::{HealthMetric, HealthStatusLoader, HealthStatusRow, HealthStatusTable};
pub use hydration::{HydrationLoader, HydrationRow, HydrationTable};
pub use sleep::{SleepLoader, SleepRow, SleepScores, SleepTable};

use crate::archive::ArchiveExtractor;
use crate::error::{AnalysisError, Result};
use crate::normalizer::{NormalizedColumn, TimestampNormalizer};
use crate::types::{Domain, NoticeKind, Notices};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One raw JSON object from an export file
pub type RawRecord = Map<String, Value>;

/// Trait for export domain loaders
pub trait DomainLoader {
    type Output;

    /// Domain reported in notices
    fn domain(&self) -> Domain;

    /// File-name glob locating this domain's files
    fn pattern(&self) -> &'static str;

    /// Map parsed documents into the domain's table; `None` when no row survives
    fn from_documents(&self, documents: Vec<Value>, notices: &mut Notices)
        -> Result<Option<Self::Output>>;
}

/// Run one loader against an extracted archive.
///
/// Every failure is converted into a notice; the caller only sees whether a
/// table was produced.
pub fn load_domain<L: DomainLoader>(
    loader: &L,
    extractor: &ArchiveExtractor,
    notices: &mut Notices,
) -> Option<L::Output> {
    let domain = loader.domain();

    let files = match extractor.find_files(loader.pattern()) {
        Ok(files) => files,
        Err(e) => {
            notices.push(NoticeKind::Parse, Some(domain), e.to_string());
            return None;
        }
    };

    if files.is_empty() {
        notices.push(
            NoticeKind::MissingDomain,
            Some(domain),
            AnalysisError::MissingDomain(domain).to_string(),
        );
        return None;
    }

    let result = read_documents(&files).and_then(|docs| loader.from_documents(docs, notices));

    match result {
        Ok(Some(table)) => Some(table),
        Ok(None) => {
            notices.push(
                NoticeKind::EmptyDomain,
                Some(domain),
                format!("{} file(s) matched but no dated rows remained", files.len()),
            );
            None
        }
        Err(e) => {
            notices.push(NoticeKind::Parse, Some(domain), e.to_string());
            None
        }
    }
}

/// Parse every file as JSON, in path order
fn read_documents(files: &[PathBuf]) -> Result<Vec<Value>> {
    files
        .iter()
        .map(|path| {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents).map_err(|e| {
                AnalysisError::parse(format!("{}: {}", path.display(), e))
            })
        })
        .collect()
}

/// Concatenate the object elements of array documents.
///
/// Non-array documents are rejected; non-object elements are skipped.
pub(crate) fn array_records(documents: Vec<Value>, domain: Domain) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for document in documents {
        match document {
            Value::Array(items) => {
                records.extend(items.into_iter().filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                }))
            }
            other => {
                return Err(AnalysisError::parse(format!(
                    "expected a JSON array of {} records, found {}",
                    domain,
                    json_kind(&other)
                )))
            }
        }
    }
    Ok(records)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether any record in the batch carries `key`
pub(crate) fn column_present(records: &[RawRecord], key: &str) -> bool {
    records.iter().any(|r| r.contains_key(key))
}

/// First candidate column carried by any record in the batch
pub(crate) fn first_present<'a>(records: &[RawRecord], candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|key| column_present(records, key))
}

/// Raw values of one column; absent keys read as null
pub(crate) fn column(records: &[RawRecord], key: &str) -> Vec<Value> {
    records
        .iter()
        .map(|r| r.get(key).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Numeric view of a JSON value; numeric strings are accepted
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

pub(crate) fn field_f64(record: &RawRecord, key: &str) -> Option<f64> {
    record.get(key).and_then(as_f64)
}

pub(crate) fn field_string(record: &RawRecord, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize a date column and report rows that could not be classified
pub(crate) fn resolve_timestamps(
    records: &[RawRecord],
    field: &str,
    domain: Domain,
    notices: &mut Notices,
) -> NormalizedColumn {
    let normalized = TimestampNormalizer::normalize(&column(records, field), field);
    if normalized.unresolved > 0 {
        notices.push(
            NoticeKind::TimestampAmbiguity,
            Some(domain),
            format!(
                "{} value(s) of {} could not be read as a timestamp ({:?}); rows dropped",
                normalized.unresolved, field, normalized.encoding
            ),
        );
    }
    normalized
}

/// Log a successful load with its date span
pub(crate) fn log_loaded(domain: Domain, rows: usize, dates: impl Iterator<Item = NaiveDate>) {
    let (first, last) = dates.fold((None, None), |(lo, hi): (Option<NaiveDate>, Option<NaiveDate>), d| {
        (
            Some(lo.map_or(d, |lo| lo.min(d))),
            Some(hi.map_or(d, |hi| hi.max(d))),
        )
    });
    match (first, last) {
        (Some(first), Some(last)) => {
            tracing::info!(%domain, rows, %first, %last, "loaded domain")
        }
        _ => tracing::info!(%domain, rows, "loaded domain"),
    }
}

/// One declarative field derivation: the first source column present in the
/// batch is scaled into `target`; nulls and absent columns read as `default`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldRule {
    pub target: &'static str,
    pub sources: &'static [&'static str],
    /// Successive divisors applied to the raw value
    pub divisors: &'static [f64],
    pub default: f64,
}

impl FieldRule {
    /// Source column this rule resolves to for the batch
    pub fn source(&self, records: &[RawRecord]) -> Option<&'static str> {
        first_present(records, self.sources)
    }

    pub fn derive(&self, records: &[RawRecord]) -> Vec<f64> {
        match self.source(records) {
            Some(source) => records
                .iter()
                .map(|r| match field_f64(r, source) {
                    Some(raw) => self.divisors.iter().fold(raw, |v, d| v / d),
                    None => self.default,
                })
                .collect(),
            None => vec![self.default; records.len()],
        }
    }
}

/// Columns produced by applying a rule table to a batch
pub(crate) struct DerivedFields {
    columns: Vec<(&'static str, Vec<f64>)>,
}

impl DerivedFields {
    pub fn derive(rules: &[FieldRule], records: &[RawRecord]) -> Self {
        Self {
            columns: rules
                .iter()
                .map(|rule| (rule.target, rule.derive(records)))
                .collect(),
        }
    }

    /// Value of `target` for row `row`
    pub fn get(&self, target: &str, row: usize) -> f64 {
        self.columns
            .iter()
            .find(|(name, _)| *name == target)
            .and_then(|(_, values)| values.get(row).copied())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Value) -> Vec<RawRecord> {
        array_records(vec![values], Domain::Activities).unwrap()
    }

    #[test]
    fn test_field_rule_prefers_first_present_source() {
        let rule = FieldRule {
            target: "active_calories",
            sources: &["bmrCalories", "calories"],
            divisors: &[],
            default: 0.0,
        };
        let batch = records(json!([
            {"bmrCalories": 120.0, "calories": 900.0},
            {"calories": 700.0},
        ]));

        // column exists in the batch, so the second row's null reads as the default
        assert_eq!(rule.derive(&batch), vec![120.0, 0.0]);
    }

    #[test]
    fn test_field_rule_absent_column_uses_default() {
        let rule = FieldRule {
            target: "distance_km",
            sources: &["distance"],
            divisors: &[100.0, 1000.0],
            default: 0.0,
        };
        let batch = records(json!([{"duration": 1000}, {}]));
        assert_eq!(rule.derive(&batch), vec![0.0, 0.0]);

        let batch = records(json!([{"distance": 500000}]));
        assert_eq!(rule.derive(&batch), vec![5.0]);
    }

    #[test]
    fn test_array_records_rejects_objects() {
        let result = array_records(vec![json!({"not": "a list"})], Domain::Sleep);
        assert!(matches!(result, Err(AnalysisError::Parse(_))));
    }

    #[test]
    fn test_array_records_skips_non_objects() {
        let batch = records(json!([{"a": 1}, 3, "x", {"b": 2}]));
        assert_eq!(batch.len(), 2);
    }
}
