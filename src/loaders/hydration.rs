//! Hydration loader
//!
//! Reads `HydrationLogFile*.json`: arrays of timestamped intake events.
//! Events without a recognized timestamp stay in the table undated.

use super::{field_f64, first_present, json_kind, log_loaded, DomainLoader, RawRecord};
use crate::error::Result;
use crate::normalizer::{self, TimestampNormalizer};
use crate::types::{CalendarFields, Domain, NoticeKind, Notices};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TIMESTAMP_FIELDS: &[&str] = &["timestampGMT", "timestampLocal"];

/// One intake event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationRow {
    pub timestamp: Option<NaiveDateTime>,
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub calendar: Option<CalendarFields>,
    pub value_ml: Option<f64>,
    pub sweat_loss_ml: Option<f64>,
    pub goal_ml: Option<f64>,
    pub activity_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HydrationTable {
    pub rows: Vec<HydrationRow>,
}

impl HydrationTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total intake per calendar date, undated events excluded
    pub fn daily_intake_ml(&self) -> Vec<(NaiveDate, f64)> {
        let mut totals: std::collections::BTreeMap<NaiveDate, f64> = Default::default();
        for row in &self.rows {
            if let (Some(date), Some(value)) = (row.date, row.value_ml) {
                *totals.entry(date).or_default() += value;
            }
        }
        totals.into_iter().collect()
    }
}

/// Loader for the hydration domain
pub struct HydrationLoader;

impl DomainLoader for HydrationLoader {
    type Output = HydrationTable;

    fn domain(&self) -> Domain {
        Domain::Hydration
    }

    fn pattern(&self) -> &'static str {
        "HydrationLogFile*.json"
    }

    fn from_documents(
        &self,
        documents: Vec<Value>,
        notices: &mut Notices,
    ) -> Result<Option<HydrationTable>> {
        let mut records: Vec<RawRecord> = Vec::new();
        for document in documents {
            match document {
                Value::Array(items) => records.extend(items.into_iter().filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })),
                other => notices.push(
                    NoticeKind::MalformedEntry,
                    Some(self.domain()),
                    format!("skipped a hydration file holding a {} instead of a list", json_kind(&other)),
                ),
            }
        }
        if records.is_empty() {
            return Ok(None);
        }

        let timestamps = first_present(&records, TIMESTAMP_FIELDS).map(|field| {
            let raw = super::column(&records, field);
            let normalized = TimestampNormalizer::normalize(&raw, field);
            (raw, normalized)
        });

        let mut dropped = 0usize;
        let mut rows = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let timestamp = match &timestamps {
                Some((raw, normalized)) => match normalized.values[i] {
                    Some(ts) => Some(ts),
                    None if normalizer::is_empty(&raw[i]) => None,
                    None => {
                        dropped += 1;
                        continue;
                    }
                },
                None => None,
            };

            rows.push(HydrationRow {
                timestamp,
                date: timestamp.map(|ts| ts.date()),
                calendar: timestamp.map(CalendarFields::from_datetime),
                value_ml: field_f64(record, "valueInML"),
                sweat_loss_ml: field_f64(record, "estimatedSweatLossInML"),
                goal_ml: field_f64(record, "goalInML"),
                activity_id: field_f64(record, "activityId").map(|id| id as i64),
            });
        }

        if dropped > 0 {
            notices.push(
                NoticeKind::TimestampAmbiguity,
                Some(self.domain()),
                format!("{} intake event(s) had an unreadable timestamp; rows dropped", dropped),
            );
        }

        if rows.is_empty() {
            return Ok(None);
        }

        log_loaded(self.domain(), rows.len(), rows.iter().filter_map(|r| r.date));
        Ok(Some(HydrationTable { rows }))
    }
}
