//! Sleep loader
//!
//! Reads every `*_sleepData.json` file: arrays of per-night summaries with stage
//! durations in seconds and an optional `sleepScores` object.

use super::{
    array_records, column, field_f64, log_loaded, resolve_timestamps, DerivedFields,
    DomainLoader, FieldRule, RawRecord,
};
use crate::error::Result;
use crate::normalizer::TimestampNormalizer;
use crate::types::{CalendarFields, Domain, Notices};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SECONDS_PER_HOUR: f64 = 3600.0;

const SLEEP_FIELDS: &[FieldRule] = &[
    FieldRule {
        target: "deep_sleep_hours",
        sources: &["deepSleepSeconds"],
        divisors: &[SECONDS_PER_HOUR],
        default: 0.0,
    },
    FieldRule {
        target: "light_sleep_hours",
        sources: &["lightSleepSeconds"],
        divisors: &[SECONDS_PER_HOUR],
        default: 0.0,
    },
    FieldRule {
        target: "rem_sleep_hours",
        sources: &["remSleepSeconds"],
        divisors: &[SECONDS_PER_HOUR],
        default: 0.0,
    },
    FieldRule {
        target: "awake_hours",
        sources: &["awakeSleepSeconds"],
        divisors: &[SECONDS_PER_HOUR],
        default: 0.0,
    },
    FieldRule {
        target: "awake_count",
        sources: &["awakeCount"],
        divisors: &[],
        default: 0.0,
    },
];

/// Per-night scores expanded from the nested `sleepScores` object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepScores {
    pub overall_score: Option<f64>,
    pub quality_score: Option<f64>,
    pub recovery_score: Option<f64>,
    pub duration_score: Option<f64>,
    pub deep_score: Option<f64>,
    pub rem_score: Option<f64>,
}

impl SleepScores {
    fn from_record(record: &RawRecord) -> Self {
        let scores = match record.get("sleepScores") {
            Some(Value::Object(scores)) => scores,
            _ => return Self::default(),
        };
        let score = |key: &str| scores.get(key).and_then(score_value);

        Self {
            overall_score: score("overallScore"),
            quality_score: score("qualityScore"),
            recovery_score: score("recoveryScore"),
            duration_score: score("durationScore"),
            deep_score: score("deepScore"),
            rem_score: score("remScore"),
        }
    }
}

/// A score is either a bare number or an object carrying `value`
fn score_value(value: &Value) -> Option<f64> {
    match value {
        Value::Object(obj) => obj.get("value").and_then(super::as_f64),
        other => super::as_f64(other),
    }
}

/// One night of sleep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRow {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub calendar: CalendarFields,
    pub sleep_start: Option<NaiveDateTime>,
    pub sleep_end: Option<NaiveDateTime>,
    pub deep_sleep_hours: f64,
    pub light_sleep_hours: f64,
    pub rem_sleep_hours: f64,
    pub awake_hours: f64,
    /// Deep + light + REM; awake time is not sleep
    pub total_sleep_hours: f64,
    pub awake_count: f64,
    #[serde(flatten)]
    pub scores: SleepScores,
    pub average_respiration: Option<f64>,
}

/// Sleep table, one row expected per night
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepTable {
    pub rows: Vec<SleepRow>,
}

impl SleepTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Loader for the sleep domain
pub struct SleepLoader;

impl DomainLoader for SleepLoader {
    type Output = SleepTable;

    fn domain(&self) -> Domain {
        Domain::Sleep
    }

    fn pattern(&self) -> &'static str {
        "*_sleepData.json"
    }

    fn from_documents(&self, documents: Vec<Value>, notices: &mut Notices) -> Result<Option<SleepTable>> {
        let records = array_records(documents, self.domain())?;
        if records.is_empty() {
            return Ok(None);
        }

        let dates = resolve_timestamps(&records, "calendarDate", self.domain(), notices);
        let starts = TimestampNormalizer::normalize(
            &column(&records, "sleepStartTimestampGMT"),
            "sleepStartTimestampGMT",
        );
        let ends = TimestampNormalizer::normalize(
            &column(&records, "sleepEndTimestampGMT"),
            "sleepEndTimestampGMT",
        );
        let derived = DerivedFields::derive(SLEEP_FIELDS, &records);

        let rows: Vec<SleepRow> = records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| {
                let date = dates.values[i]?.date();
                let deep = derived.get("deep_sleep_hours", i);
                let light = derived.get("light_sleep_hours", i);
                let rem = derived.get("rem_sleep_hours", i);

                Some(SleepRow {
                    date,
                    calendar: CalendarFields::from_date(date),
                    sleep_start: starts.values[i],
                    sleep_end: ends.values[i],
                    deep_sleep_hours: deep,
                    light_sleep_hours: light,
                    rem_sleep_hours: rem,
                    awake_hours: derived.get("awake_hours", i),
                    total_sleep_hours: deep + light + rem,
                    awake_count: derived.get("awake_count", i),
                    scores: SleepScores::from_record(record),
                    average_respiration: field_f64(record, "averageRespiration"),
                })
            })
            .collect();

        if rows.is_empty() {
            return Ok(None);
        }

        log_loaded(self.domain(), rows.len(), rows.iter().map(|r| r.date));
        Ok(Some(SleepTable { rows }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::types::NoticeKind;
    use serde_json::json;

    fn load(docs: Vec<Value>) -> Option<SleepTable> {
        SleepLoader.from_documents(docs, &mut Notices::new()).unwrap()
    }

    #[test]
    fn test_total_excludes_awake_time() {
        let table = load(vec![json!([{
            "calendarDate": "2024-01-15",
            "deepSleepSeconds": 3600,
            "lightSleepSeconds": 7200,
            "remSleepSeconds": 3600,
            "awakeSleepSeconds": 1800
        }])])
        .unwrap();

        let row = &table.rows[0];
        assert_eq!(row.total_sleep_hours, 4.0);
        assert_eq!(row.awake_hours, 0.5);
        assert_eq!(row.awake_count, 0.0);
    }

    #[test]
    fn test_scores_expand_into_fixed_columns() {
        let table = load(vec![json!([
            {
                "calendarDate": "2024-01-15",
                "sleepScores": {"overallScore": 82, "qualityScore": 75, "remScore": 90, "insight": "POSITIVE"}
            },
            {"calendarDate": "2024-01-16"}
        ])])
        .unwrap();

        assert_eq!(
            table.rows[0].scores,
            SleepScores {
                overall_score: Some(82.0),
                quality_score: Some(75.0),
                rem_score: Some(90.0),
                ..Default::default()
            }
        );
        assert_eq!(table.rows[1].scores, SleepScores::default());
    }

    #[test]
    fn test_multiple_files_concatenate() {
        let table = load(vec![
            json!([{"calendarDate": "2024-01-15", "awakeCount": 2}]),
            json!([{"calendarDate": "2024-01-16"}, {"calendarDate": "2024-01-17", "awakeCount": null}]),
        ])
        .unwrap();

        assert_eq!(table.len(), 3);
        let counts: Vec<f64> = table.rows.iter().map(|r| r.awake_count).collect();
        assert_eq!(counts, vec![2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sleep_window_timestamps_normalized() {
        let table = load(vec![json!([{
            "calendarDate": "2024-01-15",
            "sleepStartTimestampGMT": "2024-01-14T22:30:00.0",
            "sleepEndTimestampGMT": "2024-01-15T06:30:00.0"
        }])])
        .unwrap();

        let row = &table.rows[0];
        assert_eq!(row.sleep_start.unwrap().format("%H:%M").to_string(), "22:30");
        assert_eq!(row.sleep_end.unwrap().format("%H:%M").to_string(), "06:30");
    }

    #[test]
    fn test_undated_nights_dropped() {
        let table = load(vec![json!([
            {"calendarDate": null, "deepSleepSeconds": 3600},
            {"calendarDate": "2024-01-16", "deepSleepSeconds": 3600}
        ])])
        .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].calendar.weekday, "Tuesday");
    }

    #[test]
    fn test_out_of_range_epoch_date_drops_only_that_night() {
        let mut notices = Notices::new();
        let table = SleepLoader
            .from_documents(
                vec![json!([
                    {"calendarDate": 8_210_266_790_400_000i64, "deepSleepSeconds": 3600},
                    {"calendarDate": 1_705_363_200_000i64, "deepSleepSeconds": 7200}
                ])],
                &mut notices,
            )
            .unwrap()
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
        assert!(notices.contains(NoticeKind::TimestampAmbiguity, Some(Domain::Sleep)));

        let alone = SleepLoader
            .from_documents(vec![json!([{"calendarDate": 8_210_266_790_400_000i64}])], &mut Notices::new())
            .unwrap();
        assert!(alone.is_none());
    }
}
