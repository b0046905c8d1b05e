//! Change log and access log queries.

use sqlx::Row;

use super::repository::{new_id, now_timestamp, Repository};
use crate::errors::AppError;
use crate::models::{merge_trail, AccessLog, AuditEntry, AuditLog};

impl Repository {
    /// Record one authenticated request. Access logging does not bump the revision.
    pub async fn record_access(
        &self,
        user_id: Option<&str>,
        method: &str,
        path: &str,
        status_code: u16,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO access_logs (id, user_id, method, path, status_code, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(user_id)
        .bind(method)
        .bind(path)
        .bind(i64::from(status_code))
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Change log rows, newest first, optionally for one entity type or entity.
    pub async fn list_audit_logs(
        &self,
        limit: usize,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
    ) -> Result<Vec<AuditLog>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, actor_id, action, entity_type, entity_id, details, created_at
               FROM audit_logs
               WHERE (?1 IS NULL OR entity_type = ?1) AND (?2 IS NULL OR entity_id = ?2)
               ORDER BY created_at DESC
               LIMIT ?3"#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let details: String = row.get("details");
                AuditLog {
                    id: row.get("id"),
                    actor_id: row.get("actor_id"),
                    action: row.get("action"),
                    entity_type: row.get("entity_type"),
                    entity_id: row.get("entity_id"),
                    details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    pub async fn list_access_logs(&self, limit: usize) -> Result<Vec<AccessLog>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, method, path, status_code, created_at
               FROM access_logs ORDER BY created_at DESC LIMIT ?"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AccessLog {
                id: row.get("id"),
                user_id: row.get("user_id"),
                method: row.get("method"),
                path: row.get("path"),
                status_code: row.get("status_code"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Both logs merged newest first. Entity filters only apply to the change log,
    /// so access rows are left out when one is given.
    pub async fn audit_trail(
        &self,
        limit: usize,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
    ) -> Result<Vec<AuditEntry>, AppError> {
        let changes = self.list_audit_logs(limit, entity_type, entity_id).await?;
        let access = if entity_type.is_some() || entity_id.is_some() {
            Vec::new()
        } else {
            self.list_access_logs(limit).await?
        };
        Ok(merge_trail(changes, access, limit))
    }
}
