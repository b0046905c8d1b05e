//! Unit commander model.

use serde::{Deserialize, Serialize};

/// Duty status of a commander.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommanderStatus {
    Active,
    Inactive,
    OnLeave,
}

impl CommanderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommanderStatus::Active => "active",
            CommanderStatus::Inactive => "inactive",
            CommanderStatus::OnLeave => "on_leave",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CommanderStatus::Active),
            "inactive" => Some(CommanderStatus::Inactive),
            "on_leave" => Some(CommanderStatus::OnLeave),
            _ => None,
        }
    }
}

/// An officer responsible for reports raised in one state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commander {
    pub id: String,
    pub name: String,
    pub rank: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Operator account that acts as this commander
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub status: CommanderStatus,
    pub active_assignments: i64,
    pub resolved_assignments: i64,
    pub total_assignments: i64,
    /// Percentage of assignments resolved, 0 when none were given
    pub success_rate: f64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub version: i64,
}

/// Success rate as a percentage rounded to one decimal place.
pub fn success_rate(resolved: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let rate = resolved as f64 / total as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

/// Request body for registering a commander.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommanderRequest {
    pub name: String,
    pub rank: String,
    pub state: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: CommanderStatus,
}

fn default_status() -> CommanderStatus {
    CommanderStatus::Active
}

/// Request body for updating a commander's profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommanderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: Option<CommanderStatus>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}
