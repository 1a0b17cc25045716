//! Body-Battery and Stress loader
//!
//! `UDSFile*.json` holds per-day summaries. Each day may carry a
//! `bodyBattery` object and, independently, an `allDayStress` object; the
//! loader splits them into two tables. Body-Battery statistics are flattened
//! against the union of stat types seen in the batch.

use super::{
    array_records, field_f64, field_string, log_loaded, resolve_timestamps, DerivedFields,
    DomainLoader, FieldRule, RawRecord,
};
use crate::error::Result;
use crate::normalizer::TimestampNormalizer;
use crate::types::{CalendarFields, Domain, NoticeKind, Notices};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whole-day stress aggregation segment
pub const TOTAL_SEGMENT: &str = "TOTAL";

const UNKNOWN_SEGMENT: &str = "UNKNOWN";
const SECONDS_PER_MINUTE: f64 = 60.0;

const STRESS_FIELDS: &[FieldRule] = &[
    FieldRule {
        target: "rest_minutes",
        sources: &["restDuration"],
        divisors: &[SECONDS_PER_MINUTE],
        default: 0.0,
    },
    FieldRule {
        target: "activity_minutes",
        sources: &["activityDuration"],
        divisors: &[SECONDS_PER_MINUTE],
        default: 0.0,
    },
    FieldRule {
        target: "low_minutes",
        sources: &["lowDuration"],
        divisors: &[SECONDS_PER_MINUTE],
        default: 0.0,
    },
    FieldRule {
        target: "medium_minutes",
        sources: &["mediumDuration"],
        divisors: &[SECONDS_PER_MINUTE],
        default: 0.0,
    },
    FieldRule {
        target: "high_minutes",
        sources: &["highDuration"],
        divisors: &[SECONDS_PER_MINUTE],
        default: 0.0,
    },
    FieldRule {
        target: "total_minutes",
        sources: &["totalDuration"],
        divisors: &[SECONDS_PER_MINUTE],
        default: 0.0,
    },
];

/// One named Body-Battery statistic of a day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyBatteryStat {
    pub value: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
}

/// One day of Body-Battery, aligned to the table's `stat_types`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyBatteryRow {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub calendar: CalendarFields,
    pub charged: Option<f64>,
    pub drained: Option<f64>,
    pub version: Option<f64>,
    pub stats: Vec<Option<BodyBatteryStat>>,
}

/// Body-Battery table whose schema is the union of stat types in the batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyBatteryTable {
    /// Lowercased stat types in order of first appearance
    pub stat_types: Vec<String>,
    pub rows: Vec<BodyBatteryRow>,
}

impl BodyBatteryTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flattened stat column names, `<stat>_value` and `<stat>_timestamp`
    pub fn columns(&self) -> Vec<String> {
        self.stat_types
            .iter()
            .flat_map(|s| [format!("{}_value", s), format!("{}_timestamp", s)])
            .collect()
    }

    /// Values of one stat, e.g. `highest`; `None` if the stat was never seen
    pub fn stat_values(&self, stat: &str) -> Option<Vec<Option<f64>>> {
        let index = self.stat_types.iter().position(|s| s == stat)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.stats[index].as_ref().and_then(|s| s.value))
                .collect(),
        )
    }
}

/// One stress aggregation segment of a day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressRow {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub calendar: CalendarFields,
    pub segment: String,
    pub average_stress_level: Option<f64>,
    pub max_stress_level: Option<f64>,
    pub rest_minutes: f64,
    pub activity_minutes: f64,
    pub low_minutes: f64,
    pub medium_minutes: f64,
    pub high_minutes: f64,
    pub total_minutes: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StressTable {
    pub rows: Vec<StressRow>,
}

impl StressTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whole-day rows only
    pub fn total_rows(&self) -> impl Iterator<Item = &StressRow> {
        self.rows.iter().filter(|r| r.segment == TOTAL_SEGMENT)
    }
}

/// Body-Battery object of one day before stat timestamps are normalized
struct PendingDay {
    record: usize,
    charged: Option<f64>,
    drained: Option<f64>,
    version: Option<f64>,
    stats: Vec<(String, Option<f64>, Value)>,
}

/// Loader for the shared Body-Battery/Stress source
pub struct BodyBatteryLoader;

impl BodyBatteryLoader {
    fn parse_body_battery(
        records: &[RawRecord],
        malformed: &mut usize,
    ) -> (Vec<String>, Vec<PendingDay>) {
        let mut stat_types: Vec<String> = Vec::new();
        let mut days = Vec::new();

        for (i, record) in records.iter().enumerate() {
            let Some(bb) = nested_object(record, "bodyBattery", malformed) else {
                continue;
            };

            let mut stats = Vec::new();
            match bb.get("bodyBatteryStatList") {
                None | Some(Value::Null) => {}
                Some(Value::Array(entries)) => {
                    for entry in entries {
                        let stat_type = match entry {
                            Value::Object(stat) => field_string(stat, "bodyBatteryStatType")
                                .map(|t| (t.to_lowercase(), stat)),
                            _ => None,
                        };
                        let Some((stat_type, stat)) = stat_type else {
                            *malformed += 1;
                            continue;
                        };
                        if !stat_types.contains(&stat_type) {
                            stat_types.push(stat_type.clone());
                        }
                        stats.push((
                            stat_type,
                            field_f64(stat, "statsValue"),
                            stat.get("statTimestamp").cloned().unwrap_or(Value::Null),
                        ));
                    }
                }
                Some(_) => *malformed += 1,
            }

            days.push(PendingDay {
                record: i,
                charged: field_f64(bb, "chargedValue"),
                drained: field_f64(bb, "drainedValue"),
                version: field_f64(bb, "bodyBatteryVersion"),
                stats,
            });
        }

        (stat_types, days)
    }

    fn build_body_battery(
        stat_types: Vec<String>,
        days: Vec<PendingDay>,
        dates: &[Option<NaiveDateTime>],
    ) -> Option<BodyBatteryTable> {
        // one timestamp column per stat type, classified independently
        let timestamps: Vec<Vec<Option<NaiveDateTime>>> = stat_types
            .iter()
            .map(|stat_type| {
                let raw: Vec<Value> = days
                    .iter()
                    .map(|day| {
                        day.stats
                            .iter()
                            .find(|(t, _, _)| t == stat_type)
                            .map(|(_, _, ts)| ts.clone())
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                TimestampNormalizer::normalize(&raw, &format!("{}_timestamp", stat_type)).values
            })
            .collect();

        let rows: Vec<BodyBatteryRow> = days
            .into_iter()
            .enumerate()
            .filter_map(|(d, day)| {
                let date = dates[day.record]?.date();
                let mut stats: Vec<Option<BodyBatteryStat>> = vec![None; stat_types.len()];
                for (stat_type, value, _) in day.stats {
                    if let Some(k) = stat_types.iter().position(|t| *t == stat_type) {
                        stats[k] = Some(BodyBatteryStat {
                            value,
                            timestamp: timestamps[k][d],
                        });
                    }
                }

                Some(BodyBatteryRow {
                    date,
                    calendar: CalendarFields::from_date(date),
                    charged: day.charged,
                    drained: day.drained,
                    version: day.version,
                    stats,
                })
            })
            .collect();

        if rows.is_empty() {
            return None;
        }
        log_loaded(Domain::BodyBattery, rows.len(), rows.iter().map(|r| r.date));
        Some(BodyBatteryTable { stat_types, rows })
    }

    fn build_stress(
        records: &[RawRecord],
        dates: &[Option<NaiveDateTime>],
        malformed: &mut usize,
    ) -> Option<StressTable> {
        let mut owners = Vec::new();
        let mut segments: Vec<RawRecord> = Vec::new();

        for (i, record) in records.iter().enumerate() {
            let Some(stress) = nested_object(record, "allDayStress", malformed) else {
                continue;
            };
            match stress.get("aggregatorList") {
                None | Some(Value::Null) => {}
                Some(Value::Array(entries)) => {
                    for entry in entries {
                        match entry {
                            Value::Object(segment) => {
                                owners.push(i);
                                segments.push(segment.clone());
                            }
                            _ => *malformed += 1,
                        }
                    }
                }
                Some(_) => *malformed += 1,
            }
        }

        let derived = DerivedFields::derive(STRESS_FIELDS, &segments);
        let rows: Vec<StressRow> = segments
            .iter()
            .enumerate()
            .filter_map(|(s, segment)| {
                let date = dates[owners[s]]?.date();
                Some(StressRow {
                    date,
                    calendar: CalendarFields::from_date(date),
                    segment: field_string(segment, "type")
                        .unwrap_or_else(|| UNKNOWN_SEGMENT.to_string()),
                    average_stress_level: field_f64(segment, "averageStressLevel"),
                    max_stress_level: field_f64(segment, "maxStressLevel"),
                    rest_minutes: derived.get("rest_minutes", s),
                    activity_minutes: derived.get("activity_minutes", s),
                    low_minutes: derived.get("low_minutes", s),
                    medium_minutes: derived.get("medium_minutes", s),
                    high_minutes: derived.get("high_minutes", s),
                    total_minutes: derived.get("total_minutes", s),
                })
            })
            .collect();

        if rows.is_empty() {
            return None;
        }
        log_loaded(Domain::Stress, rows.len(), rows.iter().map(|r| r.date));
        Some(StressTable { rows })
    }
}

/// A nested day object; null or empty counts as absent, any other non-object is malformed
fn nested_object<'a>(record: &'a RawRecord, key: &str, malformed: &mut usize) -> Option<&'a RawRecord> {
    match record.get(key)? {
        Value::Object(obj) if !obj.is_empty() => Some(obj),
        Value::Object(_) | Value::Null => None,
        _ => {
            *malformed += 1;
            None
        }
    }
}

impl DomainLoader for BodyBatteryLoader {
    type Output = (Option<BodyBatteryTable>, Option<StressTable>);

    fn domain(&self) -> Domain {
        Domain::BodyBattery
    }

    fn pattern(&self) -> &'static str {
        "UDSFile*.json"
    }

    fn from_documents(&self, documents: Vec<Value>, notices: &mut Notices) -> Result<Option<Self::Output>> {
        let records = array_records(documents, self.domain())?;
        if records.is_empty() {
            return Ok(None);
        }

        let dates = resolve_timestamps(&records, "calendarDate", self.domain(), notices).values;
        let mut malformed = 0usize;

        let (stat_types, days) = Self::parse_body_battery(&records, &mut malformed);
        let body_battery = Self::build_body_battery(stat_types, days, &dates);
        let stress = Self::build_stress(&records, &dates, &mut malformed);

        if malformed > 0 {
            notices.push(
                NoticeKind::MalformedEntry,
                Some(self.domain()),
                format!("{} malformed body-battery/stress entries were nulled", malformed),
            );
        }

        if body_battery.is_none() && stress.is_none() {
            return Ok(None);
        }
        Ok(Some((body_battery, stress)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn load(doc: Value) -> (Option<(Option<BodyBatteryTable>, Option<StressTable>)>, Notices) {
        let mut notices = Notices::new();
        let output = BodyBatteryLoader
            .from_documents(vec![doc], &mut notices)
            .unwrap();
        (output, notices)
    }

    #[test]
    fn test_nested_objects_are_independent() {
        let (output, _) = load(json!([
            {
                "calendarDate": "2024-01-15",
                "bodyBattery": {"chargedValue": 60, "drainedValue": 55, "bodyBatteryVersion": 3.0}
            },
            {
                "calendarDate": "2024-01-16",
                "allDayStress": {"aggregatorList": [{"type": "TOTAL", "averageStressLevel": 30, "restDuration": 3600}]}
            },
            {"calendarDate": "2024-01-17"}
        ]));
        let (bb, stress) = output.unwrap();
        let bb = bb.unwrap();
        let stress = stress.unwrap();

        // the day with neither object produces no row anywhere
        assert_eq!(bb.len(), 1);
        assert_eq!(stress.len(), 1);
        assert_eq!(bb.rows[0].charged, Some(60.0));
        assert_eq!(bb.rows[0].version, Some(3.0));
        assert_eq!(stress.rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
        assert_eq!(stress.rows[0].rest_minutes, 60.0);
    }

    #[test]
    fn test_stat_list_flattened_to_union() {
        let (output, _) = load(json!([
            {
                "calendarDate": "2024-01-15",
                "bodyBattery": {
                    "chargedValue": 40,
                    "bodyBatteryStatList": [
                        {"bodyBatteryStatType": "HIGHEST", "statsValue": 95, "statTimestamp": "2024-01-15T07:00:00.0"},
                        {"bodyBatteryStatType": "LOWEST", "statsValue": 20, "statTimestamp": "2024-01-15T22:00:00.0"}
                    ]
                }
            },
            {
                "calendarDate": "2024-01-16",
                "bodyBattery": {
                    "chargedValue": 50,
                    "bodyBatteryStatList": [
                        {"bodyBatteryStatType": "ENDOFDAY", "statsValue": 35}
                    ]
                }
            }
        ]));
        let bb = output.unwrap().0.unwrap();

        assert_eq!(bb.stat_types, vec!["highest", "lowest", "endofday"]);
        assert_eq!(bb.columns().len(), 6);
        assert!(bb.columns().contains(&"highest_timestamp".to_string()));
        assert_eq!(bb.stat_values("highest").unwrap(), vec![Some(95.0), None]);
        assert_eq!(bb.stat_values("endofday").unwrap(), vec![None, Some(35.0)]);
        assert!(bb.stat_values("bogus").is_none());

        let highest = bb.rows[0].stats[0].as_ref().unwrap();
        assert_eq!(highest.timestamp.unwrap().format("%H:%M").to_string(), "07:00");
    }

    #[test]
    fn test_malformed_stat_entry_nulls_only_that_entry() {
        let (output, notices) = load(json!([
            {
                "calendarDate": "2024-01-15",
                "bodyBattery": {
                    "chargedValue": 40,
                    "bodyBatteryStatList": [
                        "broken",
                        {"statsValue": 10},
                        {"bodyBatteryStatType": "HIGHEST", "statsValue": 80}
                    ]
                }
            },
            {
                "calendarDate": "2024-01-16",
                "bodyBattery": {"chargedValue": 30, "bodyBatteryStatList": 7}
            }
        ]));
        let bb = output.unwrap().0.unwrap();

        assert_eq!(bb.len(), 2);
        assert_eq!(bb.stat_types, vec!["highest"]);
        assert_eq!(bb.stat_values("highest").unwrap(), vec![Some(80.0), None]);
        assert_eq!(bb.rows[1].charged, Some(30.0));
        assert!(notices.contains(NoticeKind::MalformedEntry, Some(Domain::BodyBattery)));
    }

    #[test]
    fn test_stress_segments_and_total() {
        let (output, _) = load(json!([{
            "calendarDate": "2024-01-15",
            "allDayStress": {"aggregatorList": [
                {"type": "TOTAL", "averageStressLevel": 35, "maxStressLevel": 90, "restDuration": 18000, "highDuration": null},
                {"type": "AWAKE", "averageStressLevel": 42, "restDuration": 600},
                {"averageStressLevel": 10}
            ]}
        }]));
        let stress = output.unwrap().1.unwrap();

        assert_eq!(stress.len(), 3);
        let totals: Vec<&StressRow> = stress.total_rows().collect();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].rest_minutes, 300.0);
        assert_eq!(totals[0].high_minutes, 0.0);
        assert_eq!(totals[0].max_stress_level, Some(90.0));
        assert_eq!(stress.rows[1].rest_minutes, 10.0);
        assert_eq!(stress.rows[2].segment, "UNKNOWN");
    }

    #[test]
    fn test_days_with_neither_object_yield_nothing() {
        let (output, _) = load(json!([
            {"calendarDate": "2024-01-15", "bodyBattery": null, "allDayStress": {}},
            {"calendarDate": "2024-01-16"}
        ]));
        assert!(output.is_none());
    }

    #[test]
    fn test_undated_days_dropped_from_both_tables() {
        let (output, notices) = load(json!([
            {
                "calendarDate": "n/a",
                "bodyBattery": {"chargedValue": 1},
                "allDayStress": {"aggregatorList": [{"type": "TOTAL"}]}
            },
            {"calendarDate": "2024-01-16", "bodyBattery": {"chargedValue": 2}}
        ]));
        let (bb, stress) = output.unwrap();

        assert_eq!(bb.unwrap().len(), 1);
        assert!(stress.is_none());
        assert!(notices.contains(NoticeKind::TimestampAmbiguity, Some(Domain::BodyBattery)));
    }
}
