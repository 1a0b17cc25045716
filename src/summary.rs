//! Headline statistics across domains

use crate::merge::DomainTables;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Activity count and distance for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyActivity {
    pub month: String,
    pub count: usize,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub count: usize,
    pub total_distance_km: f64,
    pub total_active_calories: f64,
    pub mean_duration_minutes: f64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub monthly: Vec<MonthlyActivity>,
}

/// Headline summary; each figure is `None` when its domain is absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub activities: Option<ActivitySummary>,
    pub mean_sleep_hours: Option<f64>,
    pub mean_body_battery_highest: Option<f64>,
    /// Mean of the whole-day stress segment
    pub mean_stress_level: Option<f64>,
    pub mean_hrv: Option<f64>,
}

impl Summary {
    pub fn from_tables(tables: &DomainTables) -> Self {
        Self {
            activities: tables.activities.as_ref().and_then(|table| {
                let rows = &table.rows;
                let first_date = rows.iter().map(|r| r.date).min()?;
                let last_date = rows.iter().map(|r| r.date).max()?;

                let mut months: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
                for row in rows {
                    let entry = months.entry(row.calendar.month.as_str()).or_default();
                    entry.0 += 1;
                    entry.1 += row.distance_km;
                }

                Some(ActivitySummary {
                    count: rows.len(),
                    total_distance_km: rows.iter().map(|r| r.distance_km).sum(),
                    total_active_calories: rows.iter().map(|r| r.active_calories).sum(),
                    mean_duration_minutes: mean(rows.iter().map(|r| Some(r.duration_minutes)))?,
                    first_date,
                    last_date,
                    monthly: months
                        .into_iter()
                        .map(|(month, (count, distance_km))| MonthlyActivity {
                            month: month.to_string(),
                            count,
                            distance_km,
                        })
                        .collect(),
                })
            }),
            mean_sleep_hours: tables
                .sleep
                .as_ref()
                .and_then(|t| mean(t.rows.iter().map(|r| Some(r.total_sleep_hours)))),
            mean_body_battery_highest: tables
                .body_battery
                .as_ref()
                .and_then(|t| t.stat_values("highest"))
                .and_then(|values| mean(values.into_iter())),
            mean_stress_level: tables
                .stress
                .as_ref()
                .and_then(|t| mean(t.total_rows().map(|r| r.average_stress_level))),
            mean_hrv: tables
                .health_status
                .as_ref()
                .and_then(|t| t.numeric_column("HRV_value"))
                .and_then(|values| mean(values.into_iter())),
        }
    }
}

/// Mean of the present values; `None` when none are present
fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::{ActivitiesLoader, DomainLoader, HealthStatusLoader};
    use crate::types::Notices;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_activity_summary() {
        let activities = ActivitiesLoader
            .from_documents(
                vec![json!({"summarizedActivitiesExport": [
                    {"startTimeLocal": "2024-01-30 07:00:00", "distance": 500000, "duration": 3600000, "bmrCalories": 300},
                    {"startTimeLocal": "2024-02-02 07:00:00", "distance": 1000000, "duration": 1800000, "bmrCalories": 400},
                    {"startTimeLocal": "2024-02-05 07:00:00", "distance": 200000, "duration": 1800000, "bmrCalories": 100}
                ]})],
                &mut Notices::new(),
            )
            .unwrap();
        let tables = DomainTables {
            activities,
            ..Default::default()
        };

        let summary = Summary::from_tables(&tables).activities.unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.total_distance_km, 17.0);
        assert_eq!(summary.total_active_calories, 800.0);
        assert_eq!(summary.mean_duration_minutes, 40.0);
        assert_eq!(summary.first_date, NaiveDate::from_ymd_opt(2024, 1, 30).unwrap());
        assert_eq!(
            summary.monthly,
            vec![
                MonthlyActivity { month: "2024-01".into(), count: 1, distance_km: 5.0 },
                MonthlyActivity { month: "2024-02".into(), count: 2, distance_km: 12.0 },
            ]
        );
    }

    #[test]
    fn test_absent_domains_stay_empty() {
        let health = HealthStatusLoader
            .from_documents(
                vec![json!([
                    {"calendarDate": "2024-01-01", "metrics": [{"type": "HRV", "value": 40}]},
                    {"calendarDate": "2024-01-02", "metrics": [{"type": "HRV", "value": 50}]},
                    {"calendarDate": "2024-01-03", "metrics": []}
                ])],
                &mut Notices::new(),
            )
            .unwrap();
        let tables = DomainTables {
            health_status: health,
            ..Default::default()
        };

        let summary = Summary::from_tables(&tables);
        assert_eq!(summary.mean_hrv, Some(45.0));
        assert_eq!(summary.activities, None);
        assert_eq!(summary.mean_sleep_hours, None);
        assert_eq!(summary.mean_stress_level, None);
    }
}
