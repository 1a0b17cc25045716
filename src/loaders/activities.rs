//! Activities loader
//!
//! Reads `*_summarizedActivities.json`: a wrapper object (or an array of
//! wrappers) holding the `summarizedActivitiesExport` list. Durations arrive in
//! milliseconds and distances in centimeters.

use super::{
    field_f64, field_string, first_present, log_loaded, resolve_timestamps, DerivedFields,
    DomainLoader, FieldRule, RawRecord,
};
use crate::error::{AnalysisError, Result};
use crate::types::{CalendarFields, Domain, Notices};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const WRAPPER_KEY: &str = "summarizedActivitiesExport";

/// Candidate start-time columns, in order of preference
const START_TIME_FIELDS: &[&str] = &["startTimeLocal", "startTimeGmt", "beginTimestamp"];

const ACTIVITY_FIELDS: &[FieldRule] = &[
    FieldRule {
        target: "duration_seconds",
        sources: &["elapsedDuration", "duration"],
        divisors: &[1000.0],
        default: 0.0,
    },
    FieldRule {
        target: "distance_meters",
        sources: &["distance"],
        divisors: &[100.0],
        default: 0.0,
    },
    // the nominal `calories` field is inflated in exports; bmrCalories carries the real value
    FieldRule {
        target: "active_calories",
        sources: &["bmrCalories", "calories"],
        divisors: &[],
        default: 0.0,
    },
    FieldRule {
        target: "avg_hr",
        sources: &["avgHr", "averageHR"],
        divisors: &[],
        default: 0.0,
    },
    FieldRule {
        target: "max_hr",
        sources: &["maxHr", "maxHR"],
        divisors: &[],
        default: 0.0,
    },
];

const ACTIVITY_TYPE_LABELS: &[(&str, &str)] = &[
    ("walking", "Walking"),
    ("running", "Running"),
    ("cycling", "Cycling"),
    ("swimming", "Swimming"),
    ("strength_training", "Strength Training"),
    ("yoga", "Yoga"),
    ("hiking", "Hiking"),
    ("gym", "Gym"),
    ("fitness_equipment", "Fitness Equipment"),
    ("cardio", "Cardio"),
    ("other", "Other"),
];

/// Label used when an activity carries no type
pub const UNKNOWN_ACTIVITY_TYPE: &str = "Activity";

/// One recorded activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRow {
    pub activity_id: Option<i64>,
    pub name: Option<String>,
    pub activity_type: String,
    pub start_time: NaiveDateTime,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub calendar: CalendarFields,
    pub duration_seconds: f64,
    pub duration_minutes: f64,
    pub distance_meters: f64,
    pub distance_km: f64,
    pub active_calories: f64,
    pub avg_hr: f64,
    pub max_hr: f64,
    pub steps: Option<f64>,
}

/// Activities table; several rows may share a date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitiesTable {
    pub rows: Vec<ActivityRow>,
}

impl ActivitiesTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Loader for the activities domain
pub struct ActivitiesLoader;

impl DomainLoader for ActivitiesLoader {
    type Output = ActivitiesTable;

    fn domain(&self) -> Domain {
        Domain::Activities
    }

    fn pattern(&self) -> &'static str {
        "*_summarizedActivities.json"
    }

    fn from_documents(
        &self,
        documents: Vec<Value>,
        notices: &mut Notices,
    ) -> Result<Option<ActivitiesTable>> {
        let records = unwrap_activities(documents)?;
        if records.is_empty() {
            return Ok(None);
        }

        let start_field = first_present(&records, START_TIME_FIELDS).ok_or_else(|| {
            AnalysisError::parse(format!(
                "activities carry none of the start time columns {:?}",
                START_TIME_FIELDS
            ))
        })?;

        let starts = resolve_timestamps(&records, start_field, self.domain(), notices);
        let derived = DerivedFields::derive(ACTIVITY_FIELDS, &records);
        let types_present = records.iter().any(|r| r.contains_key("activityType"));

        let rows: Vec<ActivityRow> = records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| {
                let start_time = starts.values[i]?;
                let duration_seconds = derived.get("duration_seconds", i);
                let distance_meters = derived.get("distance_meters", i);

                Some(ActivityRow {
                    activity_id: field_f64(record, "activityId").map(|id| id as i64),
                    name: field_string(record, "name")
                        .or_else(|| field_string(record, "activityName")),
                    activity_type: activity_type(record, types_present),
                    start_time,
                    date: start_time.date(),
                    calendar: CalendarFields::from_datetime(start_time),
                    duration_seconds,
                    duration_minutes: duration_seconds / 60.0,
                    distance_meters,
                    distance_km: distance_meters / 1000.0,
                    active_calories: derived.get("active_calories", i),
                    avg_hr: derived.get("avg_hr", i),
                    max_hr: derived.get("max_hr", i),
                    steps: field_f64(record, "steps"),
                })
            })
            .collect();

        if rows.is_empty() {
            return Ok(None);
        }

        log_loaded(self.domain(), rows.len(), rows.iter().map(|r| r.date));
        Ok(Some(ActivitiesTable { rows }))
    }
}

/// Pull the activity list out of every wrapper document
fn unwrap_activities(documents: Vec<Value>) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    let mut found_wrapper = false;

    for document in documents {
        let wrappers = match document {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            other => {
                return Err(AnalysisError::parse(format!(
                    "unexpected activities document: {}",
                    super::json_kind(&other)
                )))
            }
        };

        for wrapper in wrappers {
            if let Value::Object(mut map) = wrapper {
                match map.remove(WRAPPER_KEY) {
                    Some(Value::Array(list)) => {
                        found_wrapper = true;
                        records.extend(list.into_iter().filter_map(|item| match item {
                            Value::Object(activity) => Some(activity),
                            _ => None,
                        }));
                    }
                    Some(Value::Null) => found_wrapper = true,
                    Some(other) => {
                        return Err(AnalysisError::parse(format!(
                            "{} must be a list, found {}",
                            WRAPPER_KEY,
                            super::json_kind(&other)
                        )))
                    }
                    None => {}
                }
            }
        }
    }

    if !found_wrapper {
        return Err(AnalysisError::parse(format!(
            "no {} list found in activities export",
            WRAPPER_KEY
        )));
    }

    Ok(records)
}

/// Translated activity type; unmapped codes pass through unchanged
fn activity_type(record: &RawRecord, types_present: bool) -> String {
    if !types_present {
        return UNKNOWN_ACTIVITY_TYPE.to_string();
    }

    let code = match record.get("activityType") {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Object(obj)) => obj
            .get("typeKey")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    };

    match code {
        Some(code) => translate_activity_type(&code),
        None => UNKNOWN_ACTIVITY_TYPE.to_string(),
    }
}

pub(crate) fn translate_activity_type(code: &str) -> String {
    ACTIVITY_TYPE_LABELS
        .iter()
        .find(|(key, _)| *key == code)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| code.to_string())
}
