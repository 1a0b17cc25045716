//! Core types shared across the Garmin Flux pipeline
//!
//! Domains, derived calendar fields, and the non-fatal notices that loaders and
//! the merger report instead of failing.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One category of export data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Activities,
    Sleep,
    HealthStatus,
    Hydration,
    BodyBattery,
    Stress,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Activities => "activities",
            Domain::Sleep => "sleep",
            Domain::HealthStatus => "health_status",
            Domain::Hydration => "hydration",
            Domain::BodyBattery => "body_battery",
            Domain::Stress => "stress",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar fields derived from a row's primary timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFields {
    pub year: i32,
    /// Monthly period, e.g. `2024-01`
    pub month: String,
    /// Monday-to-Sunday weekly period, e.g. `2024-01-15/2024-01-21`
    pub week: String,
    /// English weekday name, e.g. `Monday`
    pub weekday: String,
    /// Hour of day, only when the source carried a sub-day timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
}

impl CalendarFields {
    /// Derive calendar fields for a calendar date
    pub fn from_date(date: NaiveDate) -> Self {
        // saturate at the ends of the representable range instead of overflowing
        let week_start = date
            .checked_sub_signed(Duration::days(date.weekday().num_days_from_monday() as i64))
            .unwrap_or(NaiveDate::MIN);
        let week_end = week_start
            .checked_add_signed(Duration::days(6))
            .unwrap_or(NaiveDate::MAX);

        Self {
            year: date.year(),
            month: format!("{:04}-{:02}", date.year(), date.month()),
            week: format!(
                "{}/{}",
                week_start.format("%Y-%m-%d"),
                week_end.format("%Y-%m-%d")
            ),
            weekday: weekday_name(date.weekday()).to_string(),
            hour: None,
        }
    }

    /// Derive calendar fields for a sub-day timestamp, including the hour
    pub fn from_datetime(timestamp: NaiveDateTime) -> Self {
        Self {
            hour: Some(timestamp.hour()),
            ..Self::from_date(timestamp.date())
        }
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Kind of non-fatal condition raised during a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// No file matched the domain's pattern
    MissingDomain,
    /// Malformed JSON or unexpected shape; the domain's table is absent
    Parse,
    /// A timestamp column could not be classified for some rows; those rows were dropped
    TimestampAmbiguity,
    /// A derived view lacked the rows or columns it needs and was skipped
    InsufficientData,
    /// Files matched but no row survived filtering
    EmptyDomain,
    /// Several rows shared a calendar date and were collapsed before merging
    DuplicateDates,
    /// A nested entry was malformed and nulled
    MalformedEntry,
}

/// A non-fatal condition surfaced to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    pub message: String,
}

/// Collector for notices raised during one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notices(Vec<Notice>);

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notice and emit it as a warning
    pub fn push(&mut self, kind: NoticeKind, domain: Option<Domain>, message: impl Into<String>) {
        let message = message.into();
        match domain {
            Some(domain) => tracing::warn!(?kind, %domain, "{}", message),
            None => tracing::warn!(?kind, "{}", message),
        }
        self.0.push(Notice {
            kind,
            domain,
            message,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any notice of `kind` was raised for `domain`
    pub fn contains(&self, kind: NoticeKind, domain: Option<Domain>) -> bool {
        self.0.iter().any(|n| n.kind == kind && n.domain == domain)
    }

    pub fn extend(&mut self, other: Notices) {
        self.0.extend(other.0);
    }

    pub fn into_vec(self) -> Vec<Notice> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_calendar_fields_from_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 17).unwrap();
        let fields = CalendarFields::from_date(date);

        assert_eq!(
            fields,
            CalendarFields {
                year: 2024,
                month: "2024-01".to_string(),
                week: "2024-01-15/2024-01-21".to_string(),
                weekday: "Wednesday".to_string(),
                hour: None,
            }
        );
    }

    #[test]
    fn test_week_period_spans_month_boundary() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let fields = CalendarFields::from_date(date);
        assert_eq!(fields.week, "2024-03-25/2024-03-31");
        assert_eq!(fields.weekday, "Sunday");
    }

    #[test]
    fn test_week_period_at_range_ends() {
        let last = CalendarFields::from_date(NaiveDate::MAX);
        assert_eq!(last.year, NaiveDate::MAX.year());
        assert!(last.week.ends_with(&NaiveDate::MAX.format("%Y-%m-%d").to_string()));

        let first = CalendarFields::from_date(NaiveDate::MIN);
        assert!(first.week.starts_with(&NaiveDate::MIN.format("%Y-%m-%d").to_string()));
    }

    #[test]
    fn test_calendar_fields_with_hour() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(7, 45, 0)
            .unwrap();
        let fields = CalendarFields::from_datetime(ts);
        assert_eq!(fields.hour, Some(7));
        assert_eq!(fields.weekday, "Monday");
    }

    #[test]
    fn test_notices_contains() {
        let mut notices = Notices::new();
        notices.push(NoticeKind::MissingDomain, Some(Domain::Hydration), "no files");

        assert_eq!(notices.len(), 1);
        assert!(notices.contains(NoticeKind::MissingDomain, Some(Domain::Hydration)));
        assert!(!notices.contains(NoticeKind::MissingDomain, Some(Domain::Sleep)));
    }
}
