//! Citizen report model and its enums.

use serde::{Deserialize, Serialize};

/// Category of the incident being reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    Terrorism,
    Kidnapping,
    ArmedRobbery,
    Banditry,
    Cultism,
    CommunalClash,
    Cybercrime,
    Vandalism,
    Other,
}

impl ThreatType {
    pub const ALL: [ThreatType; 9] = [
        ThreatType::Terrorism,
        ThreatType::Kidnapping,
        ThreatType::ArmedRobbery,
        ThreatType::Banditry,
        ThreatType::Cultism,
        ThreatType::CommunalClash,
        ThreatType::Cybercrime,
        ThreatType::Vandalism,
        ThreatType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::Terrorism => "terrorism",
            ThreatType::Kidnapping => "kidnapping",
            ThreatType::ArmedRobbery => "armed_robbery",
            ThreatType::Banditry => "banditry",
            ThreatType::Cultism => "cultism",
            ThreatType::CommunalClash => "communal_clash",
            ThreatType::Cybercrime => "cybercrime",
            ThreatType::Vandalism => "vandalism",
            ThreatType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Triage priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

/// Lifecycle status of a report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Assigned,
    InProgress,
    Resolved,
    Closed,
    Rejected,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 6] = [
        ReportStatus::Pending,
        ReportStatus::Assigned,
        ReportStatus::InProgress,
        ReportStatus::Resolved,
        ReportStatus::Closed,
        ReportStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Assigned => "assigned",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Closed => "closed",
            ReportStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// Whether the report still needs operational attention.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ReportStatus::Pending | ReportStatus::Assigned | ReportStatus::InProgress
        )
    }

    /// Every edge of the report lifecycle, including the ones driven by assignments.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Pending, Rejected)
                | (Rejected, Pending)
                | (Assigned, InProgress)
                | (Assigned, Resolved)
                | (Assigned, Pending)
                | (InProgress, Resolved)
                | (InProgress, Pending)
                | (Resolved, Closed)
        )
    }

    /// Transitions an operator may set directly. The rest happen through assignments.
    pub fn is_manual_transition(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Pending, Rejected) | (Rejected, Pending) | (Resolved, Closed)
        )
    }
}

/// A citizen-submitted incident report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub description: String,
    pub location: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lga: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub threat_type: ThreatType,
    pub priority: Priority,
    pub status: ReportStatus,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_email: Option<String>,
    pub is_anonymous: bool,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

/// Public tracking view of a report, without reporter details or narrative.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTracking {
    pub id: String,
    pub status: ReportStatus,
    pub threat_type: ThreatType,
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Report> for ReportTracking {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            status: report.status,
            threat_type: report.threat_type,
            state: report.state.clone(),
            created_at: report.created_at.clone(),
            updated_at: report.updated_at.clone(),
        }
    }
}

/// Request body for submitting a new report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    pub description: String,
    pub location: String,
    pub state: String,
    #[serde(default)]
    pub lga: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub threat_type: ThreatType,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(default)]
    pub reporter_phone: Option<String>,
    #[serde(default)]
    pub reporter_email: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

fn default_priority() -> Priority {
    Priority::Medium
}

/// Request body for editing triage fields of an existing report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportRequest {
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub threat_type: Option<ThreatType>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub lga: Option<String>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for a manual status change.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportStatusRequest {
    pub status: ReportStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}
