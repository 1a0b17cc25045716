//! Timestamp normalization
//!
//! Export files encode instants as epoch milliseconds, epoch seconds, ISO-8601
//! strings or numeric strings, with no declared unit. One column is internally
//! consistent, so the encoding is inferred per column from the magnitude of its
//! largest numeric value:
//! - max > 1e12 → milliseconds since epoch
//! - max > 1e9  → seconds since epoch
//! - otherwise  → calendar/time string parsing
//!
//! Values that fail conversion, or land outside years 1900 through 9999,
//! become `None`; a column never fails as a whole.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest numeric value above which a column is read as epoch milliseconds
pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;
/// Largest numeric value above which a column is read as epoch seconds
pub const EPOCH_SECONDS_THRESHOLD: f64 = 1e9;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Years a resolved timestamp may fall in
const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

/// Epoch unit inferred from a column's magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochUnit {
    Milliseconds,
    Seconds,
}

/// Classify the epoch unit of a column from its largest numeric value
pub fn classify_magnitude(max: f64) -> Option<EpochUnit> {
    if max > EPOCH_MILLIS_THRESHOLD {
        Some(EpochUnit::Milliseconds)
    } else if max > EPOCH_SECONDS_THRESHOLD {
        Some(EpochUnit::Seconds)
    } else {
        None
    }
}

/// Encoding chosen for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampEncoding {
    /// Every value was null or empty
    Empty,
    Epoch(EpochUnit),
    Text,
}

/// Result of normalizing one column
#[derive(Debug, Clone)]
pub struct NormalizedColumn {
    pub encoding: TimestampEncoding,
    pub values: Vec<Option<NaiveDateTime>>,
    /// Non-empty inputs that produced no timestamp
    pub unresolved: usize,
}

impl NormalizedColumn {
    /// Calendar date of each value
    pub fn dates(&self) -> Vec<Option<NaiveDate>> {
        self.values.iter().map(|v| v.map(|ts| ts.date())).collect()
    }
}

/// Stateless timestamp normalizer
pub struct TimestampNormalizer;

impl TimestampNormalizer {
    /// Convert a column of raw values into timezone-naive timestamps
    pub fn normalize(column: &[Value], field: &str) -> NormalizedColumn {
        let present = column.iter().filter(|v| !is_empty(v)).count();

        if present == 0 {
            return NormalizedColumn {
                encoding: TimestampEncoding::Empty,
                values: vec![None; column.len()],
                unresolved: 0,
            };
        }

        let numeric: Vec<Option<f64>> = column.iter().map(coerce_numeric).collect();
        let max = numeric
            .iter()
            .flatten()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));

        let (encoding, values): (TimestampEncoding, Vec<Option<NaiveDateTime>>) =
            match max.and_then(classify_magnitude) {
                Some(unit) => {
                    let values = numeric
                        .iter()
                        .map(|v| v.and_then(|v| from_epoch(v, unit)))
                        .collect();
                    (TimestampEncoding::Epoch(unit), values)
                }
                None => {
                    let values = column.iter().map(parse_text_value).collect();
                    (TimestampEncoding::Text, values)
                }
            };
        let values: Vec<Option<NaiveDateTime>> = values
            .into_iter()
            .map(|v| v.filter(|ts| SUPPORTED_YEARS.contains(&ts.year())))
            .collect();

        let resolved = values.iter().filter(|v| v.is_some()).count();
        let unresolved = present - resolved;
        tracing::debug!(field, ?encoding, present, unresolved, "classified timestamp column");

        NormalizedColumn {
            encoding,
            values,
            unresolved,
        }
    }
}

/// Null or blank string; such values carry no timestamp at all
pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Numeric view of a raw value; numeric strings count, non-finite values do not
fn coerce_numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn from_epoch(value: f64, unit: EpochUnit) -> Option<NaiveDateTime> {
    let micros = match unit {
        EpochUnit::Milliseconds => value * 1_000.0,
        EpochUnit::Seconds => value * 1_000_000.0,
    };
    if !micros.is_finite() || micros.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_micros(micros.round() as i64).map(|dt| dt.naive_utc())
}

fn parse_text_value(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(s) => parse_datetime_text(s),
        _ => None,
    }
}

/// Parse a calendar/time string; offsets are dropped, keeping the wall-clock time as written
pub fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
