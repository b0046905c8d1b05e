//! Database repository for CRUD operations.
//!
//! Entity-specific operations live in sibling modules as further `impl Repository`
//! blocks. Multi-step workflows run inside a single transaction and bump the
//! revision counter once on commit.

use chrono::{SecondsFormat, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::errors::AppError;
use crate::models::{NewNotification, RevisionInfo};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }
}

/// Current time as a fixed-width RFC 3339 UTC timestamp, so text order is time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Increment the revision ID and return the new value.
pub(super) async fn bump_revision(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    let row = sqlx::query(
        "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1 RETURNING revision_id",
    )
    .bind(now_timestamp())
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("revision_id"))
}

/// Append a change-log row.
pub(super) async fn insert_audit(
    conn: &mut SqliteConnection,
    actor_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    details: serde_json::Value,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO audit_logs (id, actor_id, action, entity_type, entity_id, details, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(actor_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(details.to_string())
    .bind(now_timestamp())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(super) async fn insert_notification(
    conn: &mut SqliteConnection,
    notification: &NewNotification,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO notifications (id, user_id, title, message, entity_type, entity_id, read, created_at) VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(new_id())
    .bind(&notification.user_id)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(&notification.entity_type)
    .bind(&notification.entity_id)
    .bind(now_timestamp())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Recompute a commander's success rate from its counters.
pub(super) async fn refresh_success_rate(
    conn: &mut SqliteConnection,
    commander_id: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"UPDATE commanders SET success_rate = CASE
               WHEN total_assignments > 0
               THEN ROUND(resolved_assignments * 100.0 / total_assignments, 1)
               ELSE 0 END
           WHERE id = ?"#,
    )
    .bind(commander_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(super) fn version_mismatch(expected: i64, current: i64) -> AppError {
    AppError::Conflict {
        message: format!(
            "Version mismatch: expected {}, current {}",
            expected, current
        ),
        current_version: current,
    }
}

pub(super) fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

pub(super) fn to_json_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}
