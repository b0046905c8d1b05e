//! List-view filtering for reports and commander selection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{Commander, CommanderStatus, Priority, Report, ReportStatus, ThreatType};

/// Report list query string. Date bounds arrive as text and are checked by
/// [`ReportQuery::filter`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<ReportStatus>,
    #[serde(default)]
    pub threat_type: Option<ThreatType>,
    /// Inclusive lower bound on `createdAt`, RFC 3339 or `YYYY-MM-DD`
    #[serde(default)]
    pub from: Option<String>,
    /// Exclusive upper bound on `createdAt`, RFC 3339 or `YYYY-MM-DD`
    #[serde(default)]
    pub to: Option<String>,
}

impl ReportQuery {
    pub fn filter(&self) -> Result<ReportFilter, AppError> {
        Ok(ReportFilter {
            state: self.state.clone(),
            priority: self.priority,
            status: self.status,
            threat_type: self.threat_type,
            from: parse_bound("from", self.from.as_deref())?,
            to: parse_bound("to", self.to.as_deref())?,
        })
    }
}

/// A bare date means midnight UTC.
pub fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(instant.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Some(midnight.and_utc()))
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Invalid {} bound {}: expected RFC 3339 or YYYY-MM-DD",
                name, raw
            ))
        })
}

/// Criteria for narrowing a report list. Absent criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub state: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<ReportStatus>,
    pub threat_type: Option<ThreatType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        if let Some(state) = &self.state {
            if !state.trim().eq_ignore_ascii_case(report.state.trim()) {
                return false;
            }
        }
        if self.priority.is_some_and(|p| p != report.priority) {
            return false;
        }
        if self.status.is_some_and(|s| s != report.status) {
            return false;
        }
        if self.threat_type.is_some_and(|t| t != report.threat_type) {
            return false;
        }
        if self.from.is_some() || self.to.is_some() {
            // Rows with unreadable timestamps never fall inside a window
            let Ok(created) = DateTime::parse_from_rfc3339(&report.created_at) else {
                return false;
            };
            let created = created.with_timezone(&Utc);
            if self.from.is_some_and(|from| created < from) {
                return false;
            }
            if self.to.is_some_and(|to| created >= to) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, reports: Vec<Report>) -> Vec<Report> {
        reports.into_iter().filter(|r| self.matches(r)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.threat_type.is_none()
            && self.from.is_none()
            && self.to.is_none()
    }
}

/// Commanders who may take a report raised in `state`: same state, on active duty.
///
/// Least loaded first, then best success rate, then name.
pub fn eligible_commanders(commanders: &[Commander], state: &str) -> Vec<Commander> {
    let mut eligible: Vec<Commander> = commanders
        .iter()
        .filter(|c| c.status == CommanderStatus::Active)
        .filter(|c| c.state.trim().eq_ignore_ascii_case(state.trim()))
        .cloned()
        .collect();

    eligible.sort_by(|a, b| {
        a.active_assignments
            .cmp(&b.active_assignments)
            .then_with(|| b.success_rate.total_cmp(&a.success_rate))
            .then_with(|| a.name.cmp(&b.name))
    });
    eligible
}
