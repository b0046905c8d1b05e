//! Change log and access log records, plus the merged trail view.

use serde::{Deserialize, Serialize};

/// A write performed against a tracked entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: serde_json::Value,
    pub created_at: String,
}

/// An authenticated request against the back office.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub method: String,
    pub path: String,
    pub status_code: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntryKind {
    Change,
    Access,
}

/// One row of the merged audit trail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub kind: AuditEntryKind,
    pub id: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<AuditLog> for AuditEntry {
    fn from(log: AuditLog) -> Self {
        Self {
            kind: AuditEntryKind::Change,
            summary: format!("{} {} {}", log.action, log.entity_type, log.entity_id),
            id: log.id,
            timestamp: log.created_at,
            actor_id: log.actor_id,
            entity_type: Some(log.entity_type),
            entity_id: Some(log.entity_id),
            details: Some(log.details),
        }
    }
}

impl From<AccessLog> for AuditEntry {
    fn from(log: AccessLog) -> Self {
        Self {
            kind: AuditEntryKind::Access,
            summary: format!("{} {} -> {}", log.method, log.path, log.status_code),
            id: log.id,
            timestamp: log.created_at,
            actor_id: log.user_id,
            entity_type: None,
            entity_id: None,
            details: None,
        }
    }
}

/// Merge both logs newest first and keep at most `limit` entries.
///
/// Timestamps are RFC 3339 in UTC, so lexical order is chronological order.
pub fn merge_trail(changes: Vec<AuditLog>, access: Vec<AccessLog>, limit: usize) -> Vec<AuditEntry> {
    let mut entries: Vec<AuditEntry> = changes
        .into_iter()
        .map(AuditEntry::from)
        .chain(access.into_iter().map(AuditEntry::from))
        .collect();
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    entries.truncate(limit);
    entries
}

/// Query parameters for the audit endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
}
