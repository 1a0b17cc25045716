//! Cross-domain merger
//!
//! Reduces each domain table to at most one row per calendar date and joins
//! them with a full outer join into one wide, date-sorted table. Activities
//! are aggregated per day; the other summary domains are expected to hold one
//! row per day already, and any duplicate dates are collapsed by the
//! configured [`DuplicatePolicy`] before the join.

use crate::config::{AnalyzerConfig, DuplicatePolicy};
use crate::error::{AnalysisError, Result};
use crate::loaders::{
    ActivitiesTable, BodyBatteryTable, HealthStatusTable, HydrationTable, SleepTable, StressTable,
};
use crate::types::{Domain, NoticeKind, Notices};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The normalized tables of one session; absent domains are `None`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainTables {
    pub activities: Option<ActivitiesTable>,
    pub sleep: Option<SleepTable>,
    pub health_status: Option<HealthStatusTable>,
    pub hydration: Option<HydrationTable>,
    pub body_battery: Option<BodyBatteryTable>,
    pub stress: Option<StressTable>,
}

impl DomainTables {
    /// Domains that produced a table
    pub fn present(&self) -> Vec<Domain> {
        [
            (Domain::Activities, self.activities.is_some()),
            (Domain::Sleep, self.sleep.is_some()),
            (Domain::HealthStatus, self.health_status.is_some()),
            (Domain::Hydration, self.hydration.is_some()),
            (Domain::BodyBattery, self.body_battery.is_some()),
            (Domain::Stress, self.stress.is_some()),
        ]
        .into_iter()
        .filter_map(|(domain, present)| present.then_some(domain))
        .collect()
    }
}

/// One calendar date of the merged table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRow {
    pub date: NaiveDate,
    /// Aligned with [`MergedTable::columns`]
    pub values: Vec<Option<f64>>,
}

/// Wide table keyed by calendar date, sorted ascending, dates unique
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedTable {
    pub columns: Vec<String>,
    pub rows: Vec<MergedRow>,
}

impl MergedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// All values of one column, in date order
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[index]).collect())
    }

    /// Value of `name` on `date`
    pub fn value(&self, date: NaiveDate, name: &str) -> Option<f64> {
        let index = self.column_index(name)?;
        self.rows
            .iter()
            .find(|r| r.date == date)
            .and_then(|r| r.values[index])
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }
}

/// Per-day view of one domain before the join
struct DomainFrame {
    domain: Domain,
    columns: Vec<&'static str>,
    rows: Vec<(NaiveDate, Vec<Option<f64>>)>,
}

/// Cross-domain merger
pub struct Merger {
    policy: DuplicatePolicy,
    min_rows: usize,
}

impl Merger {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            policy: config.duplicate_policy,
            min_rows: config.min_merged_rows,
        }
    }

    /// Join every present summary domain on calendar date.
    ///
    /// Hydration is per event and does not join. Returns
    /// [`AnalysisError::InsufficientData`] when fewer than the configured
    /// minimum of dates result.
    pub fn merge(&self, tables: &DomainTables, notices: &mut Notices) -> Result<MergedTable> {
        let mut frames = Vec::new();
        if let Some(table) = &tables.activities {
            frames.push(activities_frame(table));
        }

        let summaries = [
            tables.sleep.as_ref().map(sleep_frame),
            tables.body_battery.as_ref().map(body_battery_frame),
            tables.stress.as_ref().and_then(stress_frame),
            tables.health_status.as_ref().and_then(health_frame),
        ];
        for frame in summaries.into_iter().flatten() {
            if let Some(frame) = self.collapse(frame, notices) {
                frames.push(frame);
            }
        }

        if frames.is_empty() {
            return Err(AnalysisError::insufficient("no domain table can be merged"));
        }

        let merged = full_outer_join(frames);
        tracing::info!(
            rows = merged.len(),
            columns = merged.columns.len(),
            "merged domain tables"
        );

        if merged.len() < self.min_rows {
            return Err(AnalysisError::insufficient(format!(
                "need at least {} merged days, got {}",
                self.min_rows,
                merged.len()
            )));
        }
        Ok(merged)
    }

    /// Reduce duplicate dates to one row; `None` drops the domain from the join
    fn collapse(&self, frame: DomainFrame, notices: &mut Notices) -> Option<DomainFrame> {
        let mut groups: BTreeMap<NaiveDate, Vec<Vec<Option<f64>>>> = BTreeMap::new();
        for (date, values) in frame.rows {
            groups.entry(date).or_default().push(values);
        }

        let duplicated = groups.values().filter(|g| g.len() > 1).count();
        if duplicated > 0 {
            let action = match self.policy {
                DuplicatePolicy::KeepLast => "kept the last row of each",
                DuplicatePolicy::Mean => "averaged each",
                DuplicatePolicy::Reject => "left the domain out of the merge",
            };
            notices.push(
                NoticeKind::DuplicateDates,
                Some(frame.domain),
                format!("{} date(s) had several rows; {}", duplicated, action),
            );
            if self.policy == DuplicatePolicy::Reject {
                return None;
            }
        }

        let width = frame.columns.len();
        let rows = groups
            .into_iter()
            .filter_map(|(date, mut group)| {
                let values = match self.policy {
                    DuplicatePolicy::Mean if group.len() > 1 => mean_rows(&group, width),
                    _ => group.pop()?,
                };
                Some((date, values))
            })
            .collect();

        Some(DomainFrame {
            domain: frame.domain,
            columns: frame.columns,
            rows,
        })
    }
}

/// Column-wise mean ignoring nulls; all-null columns stay null
fn mean_rows(group: &[Vec<Option<f64>>], width: usize) -> Vec<Option<f64>> {
    (0..width)
        .map(|c| {
            let present: Vec<f64> = group.iter().filter_map(|row| row[c]).collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect()
}

fn full_outer_join(frames: Vec<DomainFrame>) -> MergedTable {
    let width: usize = frames.iter().map(|f| f.columns.len()).sum();
    let mut columns = Vec::with_capacity(width);
    let mut joined: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();

    for frame in frames {
        let offset = columns.len();
        columns.extend(frame.columns.iter().map(|c| c.to_string()));
        for (date, values) in frame.rows {
            let row = joined.entry(date).or_insert_with(|| vec![None; width]);
            for (k, value) in values.into_iter().enumerate() {
                row[offset + k] = value;
            }
        }
    }

    MergedTable {
        columns,
        rows: joined
            .into_iter()
            .map(|(date, values)| MergedRow { date, values })
            .collect(),
    }
}

#[derive(Default)]
struct ActivityDay {
    count: usize,
    distance_km: f64,
    calories: f64,
    duration_minutes: f64,
    hr_sum: f64,
}

fn activities_frame(table: &ActivitiesTable) -> DomainFrame {
    let mut days: BTreeMap<NaiveDate, ActivityDay> = BTreeMap::new();
    for row in &table.rows {
        let day = days.entry(row.date).or_default();
        day.count += 1;
        day.distance_km += row.distance_km;
        day.calories += row.active_calories;
        day.duration_minutes += row.duration_minutes;
        day.hr_sum += row.avg_hr;
    }

    DomainFrame {
        domain: Domain::Activities,
        columns: vec!["num_activities", "distance_km", "calories", "duration_minutes", "avg_hr"],
        rows: days
            .into_iter()
            .map(|(date, d)| {
                (
                    date,
                    vec![
                        Some(d.count as f64),
                        Some(d.distance_km),
                        Some(d.calories),
                        Some(d.duration_minutes),
                        Some(d.hr_sum / d.count as f64),
                    ],
                )
            })
            .collect(),
    }
}

fn sleep_frame(table: &SleepTable) -> DomainFrame {
    DomainFrame {
        domain: Domain::Sleep,
        columns: vec![
            "total_sleep_hours",
            "deep_sleep_hours",
            "rem_sleep_hours",
            "awake_count",
            "sleep_score",
        ],
        rows: table
            .rows
            .iter()
            .map(|r| {
                (
                    r.date,
                    vec![
                        Some(r.total_sleep_hours),
                        Some(r.deep_sleep_hours),
                        Some(r.rem_sleep_hours),
                        Some(r.awake_count),
                        r.scores.overall_score,
                    ],
                )
            })
            .collect(),
    }
}

fn body_battery_frame(table: &BodyBatteryTable) -> DomainFrame {
    let mut columns = vec!["bb_charged", "bb_drained"];
    let highest = table.stat_types.iter().position(|s| s == "highest");
    let lowest = table.stat_types.iter().position(|s| s == "lowest");
    if highest.is_some() {
        columns.push("bb_highest");
    }
    if lowest.is_some() {
        columns.push("bb_lowest");
    }

    let stat = |row: &crate::loaders::BodyBatteryRow, index: usize| {
        row.stats[index].as_ref().and_then(|s| s.value)
    };

    DomainFrame {
        domain: Domain::BodyBattery,
        columns,
        rows: table
            .rows
            .iter()
            .map(|r| {
                let mut values = vec![r.charged, r.drained];
                values.extend(highest.map(|k| stat(r, k)));
                values.extend(lowest.map(|k| stat(r, k)));
                (r.date, values)
            })
            .collect(),
    }
}

/// Whole-day segment only; `None` when no TOTAL segment exists
fn stress_frame(table: &StressTable) -> Option<DomainFrame> {
    let rows: Vec<(NaiveDate, Vec<Option<f64>>)> = table
        .total_rows()
        .map(|r| (r.date, vec![r.average_stress_level, Some(r.rest_minutes)]))
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(DomainFrame {
        domain: Domain::Stress,
        columns: vec!["stress_level", "rest_minutes"],
        rows,
    })
}

/// HRV and resting heart rate; `None` when the batch carries neither
fn health_frame(table: &HealthStatusTable) -> Option<DomainFrame> {
    let sources: Vec<(&'static str, Vec<Option<f64>>)> = [("hrv", "HRV_value"), ("resting_hr", "HR_value")]
        .into_iter()
        .filter_map(|(target, source)| Some((target, table.numeric_column(source)?)))
        .collect();
    if sources.is_empty() {
        return None;
    }

    Some(DomainFrame {
        domain: Domain::HealthStatus,
        columns: sources.iter().map(|(target, _)| *target).collect(),
        rows: table
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.date, sources.iter().map(|(_, values)| values[i]).collect()))
            .collect(),
    })
}
