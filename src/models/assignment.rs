//! Assignment model linking a report to the commander handling it.

use serde::{Deserialize, Serialize};

use super::{Commander, Report};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Resolved,
    Cancelled,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Accepted => "accepted",
            AssignmentStatus::Resolved => "resolved",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AssignmentStatus::Pending),
            "accepted" => Some(AssignmentStatus::Accepted),
            "resolved" => Some(AssignmentStatus::Resolved),
            "cancelled" => Some(AssignmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, AssignmentStatus::Pending | AssignmentStatus::Accepted)
    }
}

/// How an incident was concluded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Apprehended,
    Neutralized,
    Rescued,
    Dispersed,
    Unfounded,
    Referred,
    Other,
}

/// Resolution notes stored as a JSON blob on the assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub summary: String,
    pub outcome: ResolutionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions_taken: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub casualties: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrests: Option<u32>,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
    pub resolved_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub report_id: String,
    pub commander_id: String,
    pub status: AssignmentStatus,
    pub assigned_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub assigned_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    pub updated_at: String,
}

/// Request body for assigning a report to a commander.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssignmentRequest {
    pub report_id: String,
    pub commander_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The `resolution` part of a resolve submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAssignmentRequest {
    pub summary: String,
    pub outcome: ResolutionOutcome,
    #[serde(default)]
    pub actions_taken: Option<String>,
    #[serde(default)]
    pub casualties: Option<u32>,
    #[serde(default)]
    pub arrests: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAssignmentRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query parameters for listing assignments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentQuery {
    #[serde(default)]
    pub status: Option<AssignmentStatus>,
    #[serde(default)]
    pub commander_id: Option<String>,
    #[serde(default)]
    pub report_id: Option<String>,
}

/// A report with its assignment history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    pub report: Report,
    pub assignments: Vec<Assignment>,
}

/// An assignment together with the report it concerns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentWithReport {
    pub assignment: Assignment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
}

/// Everything a commander's dashboard shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommanderDashboard {
    pub commander: Commander,
    pub open_assignments: Vec<AssignmentWithReport>,
    pub recent_resolved: Vec<AssignmentWithReport>,
}
