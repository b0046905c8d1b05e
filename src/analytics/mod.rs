//! Aggregations behind the dashboard charts.
//!
//! Everything here works on rows already loaded from the database; volumes
//! are small enough that a pass over the slice per chart is fine.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::filters::{parse_bound, ReportFilter};
use crate::models::{
    Assignment, AssignmentStatus, Commander, CommanderStatus, Priority, Report, ReportStatus,
};

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

const DEFAULT_TREND_DAYS: u32 = 30;
const MAX_TREND_DAYS: u32 = 366;
const LEADERBOARD_SIZE: usize = 5;

/// One bar of a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
}

impl Bucket {
    fn new(label: impl Into<String>, count: usize) -> Self {
        Self {
            label: label.into(),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_reports: usize,
    pub pending: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub closed: usize,
    pub rejected: usize,
    /// Critical reports that are still open
    pub critical_open: usize,
    pub active_commanders: usize,
    /// Share of reports resolved or closed, as a percentage
    pub resolution_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_resolution_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub commander_id: String,
    pub name: String,
    pub state: String,
    pub success_rate: f64,
    pub resolved_assignments: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub summary: Summary,
    pub by_weekday: Vec<Bucket>,
    pub by_state: Vec<Bucket>,
    pub by_threat_type: Vec<Bucket>,
    pub by_status: Vec<Bucket>,
    pub by_priority: Vec<Bucket>,
    pub daily_trend: Vec<Bucket>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Query parameters accepted by the analytics endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub days: Option<u32>,
}

impl AnalyticsQuery {
    pub fn filter(&self) -> Result<ReportFilter, AppError> {
        Ok(ReportFilter {
            state: self.state.clone(),
            from: parse_bound("from", self.from.as_deref())?,
            to: parse_bound("to", self.to.as_deref())?,
            ..Default::default()
        })
    }

    pub fn trend_days(&self) -> u32 {
        self.days.unwrap_or(DEFAULT_TREND_DAYS).clamp(1, MAX_TREND_DAYS)
    }
}

fn created_date(report: &Report) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(&report.created_at)
        .ok()
        .map(|dt| dt.naive_utc().date())
}

fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Seven buckets, Monday first, zero-filled. Rows with unparsable dates are skipped.
pub fn count_by_weekday(reports: &[Report]) -> Vec<Bucket> {
    let mut counts = [0usize; 7];
    for date in reports.iter().filter_map(created_date) {
        counts[date.weekday().num_days_from_monday() as usize] += 1;
    }
    WEEKDAYS
        .iter()
        .zip(counts)
        .map(|(day, count)| Bucket::new(weekday_label(*day), count))
        .collect()
}

/// Group by an arbitrary key; largest bucket first, ties broken by label.
fn count_by<F>(reports: &[Report], key: F) -> Vec<Bucket>
where
    F: Fn(&Report) -> String,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for report in reports {
        *counts.entry(key(report)).or_insert(0) += 1;
    }
    let mut buckets: Vec<Bucket> = counts
        .into_iter()
        .map(|(label, count)| Bucket::new(label, count))
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    buckets
}

pub fn count_by_state(reports: &[Report]) -> Vec<Bucket> {
    count_by(reports, |r| r.state.clone())
}

pub fn count_by_threat_type(reports: &[Report]) -> Vec<Bucket> {
    count_by(reports, |r| r.threat_type.as_str().to_string())
}

pub fn count_by_status(reports: &[Report]) -> Vec<Bucket> {
    count_by(reports, |r| r.status.as_str().to_string())
}

pub fn count_by_priority(reports: &[Report]) -> Vec<Bucket> {
    count_by(reports, |r| r.priority.as_str().to_string())
}

/// Reports per calendar day for the `days` days ending at `today`, oldest first.
pub fn daily_trend(reports: &[Report], days: u32, today: NaiveDate) -> Vec<Bucket> {
    let start = today - Duration::days(i64::from(days.max(1)) - 1);
    let mut counts: HashMap<NaiveDate, usize> = HashMap::new();
    for date in reports.iter().filter_map(created_date) {
        if date >= start && date <= today {
            *counts.entry(date).or_insert(0) += 1;
        }
    }
    start
        .iter_days()
        .take_while(|d| *d <= today)
        .map(|d| Bucket::new(d.format("%Y-%m-%d").to_string(), counts.get(&d).copied().unwrap_or(0)))
        .collect()
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = part as f64 / whole as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Hours between report submission and assignment resolution, averaged.
fn mean_resolution_hours(reports: &[Report], assignments: &[Assignment]) -> Option<f64> {
    let created: HashMap<&str, &str> = reports
        .iter()
        .map(|r| (r.id.as_str(), r.created_at.as_str()))
        .collect();

    let durations: Vec<f64> = assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Resolved)
        .filter_map(|a| {
            let opened = DateTime::parse_from_rfc3339(created.get(a.report_id.as_str())?).ok()?;
            let closed = DateTime::parse_from_rfc3339(a.resolved_at.as_deref()?).ok()?;
            let seconds = (closed - opened).num_seconds();
            (seconds >= 0).then(|| seconds as f64 / 3600.0)
        })
        .collect();

    if durations.is_empty() {
        return None;
    }
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

pub fn summary(reports: &[Report], assignments: &[Assignment], commanders: &[Commander]) -> Summary {
    let count = |status: ReportStatus| reports.iter().filter(|r| r.status == status).count();
    let resolved = count(ReportStatus::Resolved);
    let closed = count(ReportStatus::Closed);

    Summary {
        total_reports: reports.len(),
        pending: count(ReportStatus::Pending),
        assigned: count(ReportStatus::Assigned),
        in_progress: count(ReportStatus::InProgress),
        resolved,
        closed,
        rejected: count(ReportStatus::Rejected),
        critical_open: reports
            .iter()
            .filter(|r| r.priority == Priority::Critical && r.status.is_open())
            .count(),
        active_commanders: commanders
            .iter()
            .filter(|c| c.status == CommanderStatus::Active)
            .count(),
        resolution_rate: percentage(resolved + closed, reports.len()),
        mean_resolution_hours: mean_resolution_hours(reports, assignments),
    }
}

/// Best commanders by success rate, then by volume resolved.
pub fn commander_leaderboard(commanders: &[Commander], n: usize) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&Commander> = commanders
        .iter()
        .filter(|c| c.total_assignments > 0)
        .collect();
    ranked.sort_by(|a, b| {
        b.success_rate
            .total_cmp(&a.success_rate)
            .then_with(|| b.resolved_assignments.cmp(&a.resolved_assignments))
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked
        .into_iter()
        .take(n)
        .map(|c| LeaderboardEntry {
            commander_id: c.id.clone(),
            name: c.name.clone(),
            state: c.state.clone(),
            success_rate: c.success_rate,
            resolved_assignments: c.resolved_assignments,
        })
        .collect()
}

pub fn build_report(
    reports: &[Report],
    assignments: &[Assignment],
    commanders: &[Commander],
    trend_days: u32,
    today: NaiveDate,
) -> AnalyticsReport {
    AnalyticsReport {
        summary: summary(reports, assignments, commanders),
        by_weekday: count_by_weekday(reports),
        by_state: count_by_state(reports),
        by_threat_type: count_by_threat_type(reports),
        by_status: count_by_status(reports),
        by_priority: count_by_priority(reports),
        daily_trend: daily_trend(reports, trend_days, today),
        leaderboard: commander_leaderboard(commanders, LEADERBOARD_SIZE),
    }
}
