//! Health-status loader
//!
//! Reads `*_healthStatusData.json`: per-day records each carrying a
//! variable-length `metrics` list. The batch is flattened against the union
//! of metric types, so every row exposes the same columns.

use super::{array_records, log_loaded, resolve_timestamps, DomainLoader, RawRecord};
use crate::error::Result;
use crate::normalizer::TimestampNormalizer;
use crate::types::{CalendarFields, Domain, NoticeKind, Notices};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const UNKNOWN_METRIC_TYPE: &str = "unknown";

/// Column suffixes for each metric type, in column order
pub const METRIC_COLUMN_SUFFIXES: &[&str] =
    &["value", "baseline_upper", "baseline_lower", "percentage", "status"];

/// One named metric of a day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMetric {
    pub value: Option<f64>,
    pub baseline_upper: Option<f64>,
    pub baseline_lower: Option<f64>,
    pub percentage: Option<f64>,
    pub status: Option<String>,
}

impl HealthMetric {
    fn from_entry(entry: &RawRecord) -> Self {
        Self {
            value: super::field_f64(entry, "value"),
            baseline_upper: super::field_f64(entry, "baselineUpperLimit"),
            baseline_lower: super::field_f64(entry, "baselineLowerLimit"),
            percentage: super::field_f64(entry, "percentage"),
            status: super::field_string(entry, "status"),
        }
    }

    fn numeric(&self, suffix: &str) -> Option<f64> {
        match suffix {
            "value" => self.value,
            "baseline_upper" => self.baseline_upper,
            "baseline_lower" => self.baseline_lower,
            "percentage" => self.percentage,
            _ => None,
        }
    }
}

/// One day of health metrics, aligned to the table's `metric_types`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatusRow {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub calendar: CalendarFields,
    pub create_timestamp: Option<NaiveDateTime>,
    pub update_timestamp: Option<NaiveDateTime>,
    /// `metrics[i]` belongs to `metric_types[i]`; `None` when the day lacks that type
    pub metrics: Vec<Option<HealthMetric>>,
}

/// Health-status table whose schema is the union of metric types in the batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatusTable {
    /// Metric types in order of first appearance
    pub metric_types: Vec<String>,
    pub rows: Vec<HealthStatusRow>,
}

impl HealthStatusTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flattened metric column names, `<type>_<suffix>`
    pub fn columns(&self) -> Vec<String> {
        self.metric_types
            .iter()
            .flat_map(|t| {
                METRIC_COLUMN_SUFFIXES
                    .iter()
                    .map(move |suffix| format!("{}_{}", t, suffix))
            })
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.split_column(name).is_some()
    }

    /// Values of a numeric metric column such as `HRV_value`; `None` if the column does not exist
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let (index, suffix) = self.split_column(name)?;
        if suffix == "status" {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| row.metrics[index].as_ref().and_then(|m| m.numeric(suffix)))
                .collect(),
        )
    }

    /// Values of a `<type>_status` column
    pub fn status_column(&self, name: &str) -> Option<Vec<Option<String>>> {
        let (index, suffix) = self.split_column(name)?;
        if suffix != "status" {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| row.metrics[index].as_ref().and_then(|m| m.status.clone()))
                .collect(),
        )
    }

    fn split_column<'a>(&self, name: &'a str) -> Option<(usize, &'a str)> {
        METRIC_COLUMN_SUFFIXES.iter().find_map(|suffix| {
            let metric = name.strip_suffix(suffix)?.strip_suffix('_')?;
            let index = self.metric_types.iter().position(|t| t == metric)?;
            Some((index, &name[name.len() - suffix.len()..]))
        })
    }
}

/// Loader for the health-status domain
pub struct HealthStatusLoader;

impl DomainLoader for HealthStatusLoader {
    type Output = HealthStatusTable;

    fn domain(&self) -> Domain {
        Domain::HealthStatus
    }

    fn pattern(&self) -> &'static str {
        "*_healthStatusData.json"
    }

    fn from_documents(
        &self,
        documents: Vec<Value>,
        notices: &mut Notices,
    ) -> Result<Option<HealthStatusTable>> {
        let records = array_records(documents, self.domain())?;
        if records.is_empty() {
            return Ok(None);
        }

        // collect the union of metric types before materializing any row
        let mut metric_types: Vec<String> = Vec::new();
        let mut per_record: Vec<Vec<(String, HealthMetric)>> = Vec::with_capacity(records.len());
        let mut malformed = 0usize;

        for record in &records {
            let mut metrics = Vec::new();
            if let Some(Value::Array(entries)) = record.get("metrics") {
                for entry in entries {
                    let Value::Object(entry) = entry else {
                        malformed += 1;
                        continue;
                    };
                    let metric_type = super::field_string(entry, "type")
                        .unwrap_or_else(|| UNKNOWN_METRIC_TYPE.to_string());
                    if !metric_types.contains(&metric_type) {
                        metric_types.push(metric_type.clone());
                    }
                    metrics.push((metric_type, HealthMetric::from_entry(entry)));
                }
            }
            per_record.push(metrics);
        }

        if malformed > 0 {
            notices.push(
                NoticeKind::MalformedEntry,
                Some(self.domain()),
                format!("{} metric entries were not objects and were skipped", malformed),
            );
        }

        let dates = resolve_timestamps(&records, "calendarDate", self.domain(), notices);
        let created = TimestampNormalizer::normalize(
            &super::column(&records, "createTimestampUTC"),
            "createTimestampUTC",
        );
        let updated = TimestampNormalizer::normalize(
            &super::column(&records, "updateTimestampUTC"),
            "updateTimestampUTC",
        );

        let rows: Vec<HealthStatusRow> = per_record
            .into_iter()
            .enumerate()
            .filter_map(|(i, metrics)| {
                let date = dates.values[i]?.date();
                let mut aligned: Vec<Option<HealthMetric>> = vec![None; metric_types.len()];
                for (metric_type, metric) in metrics {
                    if let Some(index) = metric_types.iter().position(|t| *t == metric_type) {
                        aligned[index] = Some(metric);
                    }
                }

                Some(HealthStatusRow {
                    date,
                    calendar: CalendarFields::from_date(date),
                    create_timestamp: created.values[i],
                    update_timestamp: updated.values[i],
                    metrics: aligned,
                })
            })
            .collect();

        if rows.is_empty() {
            return Ok(None);
        }

        log_loaded(self.domain(), rows.len(), rows.iter().map(|r| r.date));
        Ok(Some(HealthStatusTable { metric_types, rows }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn load(doc: Value) -> (Option<HealthStatusTable>, Notices) {
        let mut notices = Notices::new();
        let table = HealthStatusLoader
            .from_documents(vec![doc], &mut notices)
            .unwrap();
        (table, notices)
    }

    #[test]
    fn test_schema_is_union_of_metric_types() {
        let (table, _) = load(json!([
            {
                "calendarDate": "2024-01-15",
                "metrics": [
                    {"type": "HRV", "value": 48.0, "baselineUpperLimit": 60, "baselineLowerLimit": 40, "percentage": 45.0, "status": "IN_RANGE"},
                    {"type": "HR", "value": 52}
                ]
            },
            {
                "calendarDate": "2024-01-16",
                "metrics": [{"type": "HR", "value": 55}]
            }
        ]));
        let table = table.unwrap();

        assert_eq!(table.metric_types, vec!["HRV", "HR"]);
        assert!(table.columns().contains(&"HRV_value".to_string()));
        assert!(table.columns().contains(&"HR_status".to_string()));
        assert_eq!(table.columns().len(), 10);
        assert_eq!(table.numeric_column("HRV_value").unwrap(), vec![Some(48.0), None]);
        assert_eq!(table.numeric_column("HR_value").unwrap(), vec![Some(52.0), Some(55.0)]);
        assert_eq!(
            table.status_column("HRV_status").unwrap(),
            vec![Some("IN_RANGE".to_string()), None]
        );
        assert_eq!(table.numeric_column("HRV_baseline_upper").unwrap()[0], Some(60.0));
    }

    #[test]
    fn test_unknown_column_is_absent() {
        let (table, _) = load(json!([
            {"calendarDate": "2024-01-15", "metrics": [{"type": "SPO2", "value": 96}]}
        ]));
        let table = table.unwrap();
        assert!(table.numeric_column("HRV_value").is_none());
        assert!(!table.has_column("SPO2_nothing"));
        assert!(table.has_column("SPO2_percentage"));
    }

    #[test]
    fn test_untyped_metric_and_malformed_entries() {
        let (table, notices) = load(json!([
            {"calendarDate": "2024-01-15", "metrics": [{"value": 1.0}, "garbage"]},
            {"calendarDate": "2024-01-16", "metrics": "not a list"}
        ]));
        let table = table.unwrap();

        assert_eq!(table.metric_types, vec!["unknown"]);
        assert_eq!(table.rows[1].metrics, vec![None]);
        assert!(notices.contains(NoticeKind::MalformedEntry, Some(Domain::HealthStatus)));
    }

    #[test]
    fn test_undated_records_dropped() {
        let (table, notices) = load(json!([
            {"calendarDate": "??", "metrics": [{"type": "HR", "value": 50}]},
            {"calendarDate": "2024-01-16", "metrics": []}
        ]));
        let table = table.unwrap();
        assert_eq!(table.len(), 1);
        // columns observed on dropped rows still belong to the batch schema
        assert!(table.has_column("HR_value"));
        assert!(notices.contains(NoticeKind::TimestampAmbiguity, Some(Domain::HealthStatus)));
    }
}
