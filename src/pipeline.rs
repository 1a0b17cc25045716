//! Pipeline orchestration
//!
//! This module provides the public API for Garmin Flux. One
//! [`ExportAnalyzer`] owns one extracted export and runs the full pipeline
//! over it: domain loaders → cross-domain merge → correlation → insights,
//! with a headline summary computed from the domain tables.

use crate::archive::ArchiveExtractor;
use crate::config::AnalyzerConfig;
use crate::correlation::{CorrelationAnalyzer, CorrelationResult};
use crate::error::Result;
use crate::insights::{describe, Insights};
use crate::loaders::{
    load_domain, ActivitiesLoader, BodyBatteryLoader, HealthStatusLoader, HydrationLoader,
    SleepLoader,
};
use crate::merge::{DomainTables, MergedTable, Merger};
use crate::summary::Summary;
use crate::types::{Notice, NoticeKind, Notices};
use crate::{FLUX_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Everything one analysis session produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub session_id: Uuid,
    pub producer: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub tables: DomainTables,
    /// Absent when too few dates could be merged
    pub merged: Option<MergedTable>,
    /// Absent when the merged table lacks the rows or columns for a matrix
    pub correlation: Option<CorrelationResult>,
    pub insights: Option<Insights>,
    pub summary: Summary,
    pub notices: Vec<Notice>,
}

/// Analyze an in-memory export archive with default settings.
///
/// # Example
/// ```ignore
/// let report = analyze_export(&std::fs::read("export.zip")?)?;
/// println!("{} notices", report.notices.len());
/// ```
pub fn analyze_export(bytes: &[u8]) -> Result<AnalysisReport> {
    Ok(ExportAnalyzer::from_bytes(bytes, AnalyzerConfig::default())?.analyze())
}

/// One analysis session over an extracted export.
///
/// The scratch directory is removed when the analyzer is dropped.
pub struct ExportAnalyzer {
    extractor: ArchiveExtractor,
    config: AnalyzerConfig,
    session_id: Uuid,
}

impl ExportAnalyzer {
    /// Extract an in-memory archive; only archive failures are returned
    pub fn from_bytes(bytes: &[u8], config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_extractor(ArchiveExtractor::from_bytes(bytes)?, config))
    }

    /// Extract an archive file
    pub fn from_path(path: &Path, config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_extractor(ArchiveExtractor::from_path(path)?, config))
    }

    fn with_extractor(extractor: ArchiveExtractor, config: AnalyzerConfig) -> Self {
        Self {
            extractor,
            config,
            session_id: Uuid::new_v4(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Run every domain loader. Loaders are independent; a failing one leaves
    /// its table absent and records a notice.
    pub fn load_tables(&self, notices: &mut Notices) -> DomainTables {
        let (body_battery, stress) =
            load_domain(&BodyBatteryLoader, &self.extractor, notices).unwrap_or((None, None));

        DomainTables {
            activities: load_domain(&ActivitiesLoader, &self.extractor, notices),
            sleep: load_domain(&SleepLoader, &self.extractor, notices),
            health_status: load_domain(&HealthStatusLoader, &self.extractor, notices),
            hydration: load_domain(&HydrationLoader, &self.extractor, notices),
            body_battery,
            stress,
        }
    }

    /// Run the full pipeline. Never fails: every unavailable view is
    /// reported as a notice.
    pub fn analyze(&self) -> AnalysisReport {
        let span = tracing::info_span!("analysis", session_id = %self.session_id);
        let _guard = span.enter();

        let mut notices = Notices::new();
        let tables = self.load_tables(&mut notices);

        // the merge is a join: it only starts once every loader has finished
        let merged = match Merger::new(&self.config).merge(&tables, &mut notices) {
            Ok(merged) => Some(merged),
            Err(e) => {
                notices.push(NoticeKind::InsufficientData, None, e.to_string());
                None
            }
        };

        let correlation = merged.as_ref().and_then(|merged| {
            match CorrelationAnalyzer::new(&self.config).analyze(merged, &mut notices) {
                Ok(result) => Some(result),
                Err(e) => {
                    notices.push(NoticeKind::InsufficientData, None, e.to_string());
                    None
                }
            }
        });

        let insights = correlation
            .as_ref()
            .map(|result| describe(result, self.config.top_pairs));
        let summary = Summary::from_tables(&tables);

        tracing::info!(
            domains = tables.present().len(),
            notices = notices.len(),
            "analysis complete"
        );

        AnalysisReport {
            session_id: self.session_id,
            producer: PRODUCER_NAME.to_string(),
            version: FLUX_VERSION.to_string(),
            generated_at: Utc::now(),
            tables,
            merged,
            correlation,
            insights,
            summary,
            notices: notices.into_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use crate::error::AnalysisError;
    use crate::types::Domain;
    use serde_json::{json, Value};

    fn days() -> Vec<String> {
        (1..=6).map(|d| format!("2024-03-{:02}", d)).collect()
    }

    fn activities_json() -> String {
        let records: Vec<Value> = days()
            .iter()
            .enumerate()
            .map(|(i, day)| {
                json!({
                    "activityId": 1000 + i,
                    "name": "Morning Run",
                    "activityType": "running",
                    "startTimeLocal": format!("{} 07:00:00", day),
                    "duration": 1_800_000.0 + 300_000.0 * i as f64,
                    "distance": 400_000.0 + 50_000.0 * (i % 3) as f64,
                    "bmrCalories": 200.0 + 40.0 * i as f64,
                    "calories": 9999,
                    "avgHr": 140 + i
                })
            })
            .collect();
        json!([{"summarizedActivitiesExport": records}]).to_string()
    }

    fn sleep_json() -> String {
        let records: Vec<Value> = days()
            .iter()
            .enumerate()
            .map(|(i, day)| {
                json!({
                    "calendarDate": day,
                    "deepSleepSeconds": 3600 + 600 * i,
                    "lightSleepSeconds": 10800 + 900 * (i % 2),
                    "remSleepSeconds": 5400,
                    "awakeSleepSeconds": 900,
                    "sleepScores": {"overallScore": 70 + i}
                })
            })
            .collect();
        Value::Array(records).to_string()
    }

    fn uds_json() -> String {
        let records: Vec<Value> = days()
            .iter()
            .enumerate()
            .map(|(i, day)| {
                json!({
                    "calendarDate": day,
                    "bodyBattery": {
                        "chargedValue": 40 + 5 * i,
                        "drainedValue": 50 + 3 * (i % 4),
                        "bodyBatteryStatList": [
                            {"bodyBatteryStatType": "HIGHEST", "statsValue": 80 + i, "statTimestamp": format!("{}T07:00:00.0", day)}
                        ]
                    },
                    "allDayStress": {"aggregatorList": [
                        {"type": "TOTAL", "averageStressLevel": 40 - 2 * i as i64 + 5 * (i % 2) as i64, "restDuration": 20000}
                    ]}
                })
            })
            .collect();
        Value::Array(records).to_string()
    }

    fn health_json() -> String {
        let records: Vec<Value> = days()
            .iter()
            .enumerate()
            .map(|(i, day)| {
                json!({
                    "calendarDate": day,
                    "metrics": [
                        {"type": "HRV", "value": 45.0 + 1.5 * i as f64},
                        {"type": "HR", "value": 55 - (i % 3) as i64}
                    ]
                })
            })
            .collect();
        Value::Array(records).to_string()
    }

    fn full_export() -> Vec<u8> {
        let activities = activities_json();
        let sleep = sleep_json();
        let uds = uds_json();
        let health = health_json();
        build_zip(&[
            ("DI_CONNECT/DI-Connect-Fitness/user_0_summarizedActivities.json", activities.as_str()),
            ("DI_CONNECT/DI-Connect-Wellness/2024_sleepData.json", sleep.as_str()),
            ("DI_CONNECT/DI-Connect-Aggregator/UDSFile_2024.json", uds.as_str()),
            ("DI_CONNECT/DI-Connect-Wellness/user_healthStatusData.json", health.as_str()),
            (
                "DI_CONNECT/DI-Connect-Aggregator/HydrationLogFile_2024.json",
                r#"[{"timestampGMT": "2024-03-01T09:00:00.0", "valueInML": 250}]"#,
            ),
        ])
    }

    #[test]
    fn test_full_export() {
        let report = analyze_export(&full_export()).unwrap();

        assert_eq!(report.producer, "garmin-flux");
        assert_eq!(report.tables.present().len(), 6);
        assert_eq!(report.tables.activities.as_ref().unwrap().len(), 6);
        assert_eq!(report.tables.hydration.as_ref().unwrap().len(), 1);

        let merged = report.merged.as_ref().unwrap();
        assert_eq!(merged.len(), 6);

        let correlation = report.correlation.as_ref().unwrap();
        let m = &correlation.matrix;
        assert_eq!(m.columns.len(), 10);
        for i in 0..m.columns.len() {
            assert_eq!(m.values[i][i], 1.0);
            for j in 0..m.columns.len() {
                assert_eq!(m.values[i][j], m.values[j][i]);
            }
        }
        assert_eq!(correlation.ranked_pairs.len(), 45);

        let insights = report.insights.as_ref().unwrap();
        assert_eq!(insights.pairs.len(), 5);
        assert!(!insights.recommendations.is_empty());

        let summary = report.summary.activities.as_ref().unwrap();
        // bmr calories win over the nominal field
        assert_eq!(summary.total_active_calories, 6.0 * 200.0 + 40.0 * 15.0);
    }

    #[test]
    fn test_missing_domains_do_not_block_others() {
        let sleep = sleep_json();
        let bytes = build_zip(&[("x_sleepData.json", sleep.as_str())]);
        let report = analyze_export(&bytes).unwrap();

        assert!(report.tables.sleep.is_some());
        assert!(report.tables.activities.is_none());
        assert!(report.tables.body_battery.is_none());
        assert!(report.tables.stress.is_none());

        let missing: Vec<Domain> = report
            .notices
            .iter()
            .filter(|n| n.kind == NoticeKind::MissingDomain)
            .filter_map(|n| n.domain)
            .collect();
        assert!(missing.contains(&Domain::Activities));
        assert!(missing.contains(&Domain::HealthStatus));
        assert!(missing.contains(&Domain::Hydration));
        assert!(missing.contains(&Domain::BodyBattery));

        // only two sleep candidates: merged, but no matrix
        assert_eq!(report.merged.as_ref().unwrap().len(), 6);
        assert!(report.correlation.is_none());
        assert!(report.insights.is_none());
    }

    #[test]
    fn test_malformed_domain_is_isolated() {
        let activities = activities_json();
        let bytes = build_zip(&[
            ("a_summarizedActivities.json", activities.as_str()),
            ("b_sleepData.json", "{ this is not json"),
        ]);
        let report = analyze_export(&bytes).unwrap();

        assert!(report.tables.activities.is_some());
        assert!(report.tables.sleep.is_none());
        assert!(report
            .notices
            .iter()
            .any(|n| n.kind == NoticeKind::Parse && n.domain == Some(Domain::Sleep)));
    }

    #[test]
    fn test_cross_domain_dates_are_unioned() {
        let activities = json!([{"summarizedActivitiesExport": [
            {"startTimeLocal": "2024-03-01 07:00:00"},
            {"startTimeLocal": "2024-03-02 07:00:00"}
        ]}])
        .to_string();
        let sleep = json!([
            {"calendarDate": "2024-03-02"},
            {"calendarDate": "2024-03-03"}
        ])
        .to_string();
        let bytes = build_zip(&[
            ("a_summarizedActivities.json", activities.as_str()),
            ("b_sleepData.json", sleep.as_str()),
        ]);

        let config = AnalyzerConfig {
            min_merged_rows: 3,
            ..Default::default()
        };
        let report = ExportAnalyzer::from_bytes(&bytes, config).unwrap().analyze();
        let merged = report.merged.unwrap();

        let dates: Vec<String> = merged.dates().iter().map(|d| d.to_string()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-02", "2024-03-03"]);
    }

    #[test]
    fn test_too_few_days_reports_insufficient_data() {
        let bytes = build_zip(&[("b_sleepData.json", r#"[{"calendarDate": "2024-03-02"}]"#)]);
        let report = analyze_export(&bytes).unwrap();

        assert!(report.merged.is_none());
        assert!(report.notices.iter().any(|n| n.kind == NoticeKind::InsufficientData));
    }

    #[test]
    fn test_invalid_archive_is_fatal() {
        let result = analyze_export(b"PK but not really");
        assert!(matches!(result, Err(AnalysisError::Archive(_))));
    }

    #[test]
    fn test_report_serializes() {
        let report = analyze_export(&full_export()).unwrap();
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["session_id"], json!(report.session_id.to_string()));
        assert!(value["tables"]["sleep"]["rows"].is_array());
        assert!(value["notices"].is_array());
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        let bytes = full_export();
        let a = ExportAnalyzer::from_bytes(&bytes, AnalyzerConfig::default()).unwrap();
        let b = ExportAnalyzer::from_bytes(&bytes, AnalyzerConfig::default()).unwrap();
        assert_ne!(a.session_id(), b.session_id());
    }
}
