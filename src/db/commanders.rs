//! Commander persistence.

use serde_json::json;
use sqlx::{Row, SqliteConnection};

use super::repository::{
    bump_revision, insert_audit, new_id, now_timestamp, version_mismatch, Repository,
};
use crate::errors::AppError;
use crate::models::{Commander, CommanderStatus, CreateCommanderRequest, UpdateCommanderRequest};

const COMMANDER_COLUMNS: &str = r#"id, name, rank, state, unit, phone, email, user_id, status,
    active_assignments, resolved_assignments, total_assignments, success_rate,
    created_at, updated_at, version"#;

impl Repository {
    /// List all commanders ordered by state, then name.
    pub async fn list_commanders(&self) -> Result<Vec<Commander>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM commanders ORDER BY state, name",
            COMMANDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(commander_from_row).collect())
    }

    pub async fn get_commander(&self, id: &str) -> Result<Option<Commander>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_commander(&mut conn, id).await
    }

    /// The commander profile an operator account acts as, if any.
    pub async fn find_commander_by_user(&self, user_id: &str) -> Result<Option<Commander>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM commanders WHERE user_id = ? LIMIT 1",
            COMMANDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(commander_from_row))
    }

    /// Register a commander. `state` is the canonical state name.
    pub async fn create_commander(
        &self,
        request: &CreateCommanderRequest,
        state: &str,
        actor_id: &str,
    ) -> Result<Commander, AppError> {
        let now = now_timestamp();
        let commander = Commander {
            id: new_id(),
            name: request.name.trim().to_string(),
            rank: request.rank.trim().to_string(),
            state: state.to_string(),
            unit: request.unit.clone(),
            phone: request.phone.clone(),
            email: request.email.clone(),
            user_id: request.user_id.clone(),
            status: request.status,
            active_assignments: 0,
            resolved_assignments: 0,
            total_assignments: 0,
            success_rate: 0.0,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO commanders ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0, ?, ?, 1)",
            COMMANDER_COLUMNS
        ))
        .bind(&commander.id)
        .bind(&commander.name)
        .bind(&commander.rank)
        .bind(&commander.state)
        .bind(&commander.unit)
        .bind(&commander.phone)
        .bind(&commander.email)
        .bind(&commander.user_id)
        .bind(commander.status.as_str())
        .bind(&commander.created_at)
        .bind(&commander.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_audit(
            &mut tx,
            Some(actor_id),
            "create",
            "commander",
            &commander.id,
            json!({ "name": commander.name, "state": commander.state }),
        )
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(commander)
    }

    /// Update a commander's profile. Counters are never client-writable.
    ///
    /// `state` is the canonical form of `request.state` when one was given.
    pub async fn update_commander(
        &self,
        id: &str,
        request: &UpdateCommanderRequest,
        state: Option<&str>,
        actor_id: &str,
    ) -> Result<Commander, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_commander(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Commander {} not found", id)))?;

        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(version_mismatch(expected, existing.version));
            }
        }

        let updated = Commander {
            name: request
                .name
                .as_ref()
                .map(|n| n.trim().to_string())
                .unwrap_or(existing.name.clone()),
            rank: request
                .rank
                .as_ref()
                .map(|r| r.trim().to_string())
                .unwrap_or(existing.rank.clone()),
            state: state.map(str::to_string).unwrap_or(existing.state.clone()),
            unit: request.unit.clone().or(existing.unit.clone()),
            phone: request.phone.clone().or(existing.phone.clone()),
            email: request.email.clone().or(existing.email.clone()),
            user_id: request.user_id.clone().or(existing.user_id.clone()),
            status: request.status.unwrap_or(existing.status),
            updated_at: now_timestamp(),
            version: existing.version + 1,
            ..existing.clone()
        };

        let result = sqlx::query(
            r#"UPDATE commanders SET name = ?, rank = ?, state = ?, unit = ?, phone = ?, email = ?,
                   user_id = ?, status = ?, updated_at = ?, version = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(&updated.name)
        .bind(&updated.rank)
        .bind(&updated.state)
        .bind(&updated.unit)
        .bind(&updated.phone)
        .bind(&updated.email)
        .bind(&updated.user_id)
        .bind(updated.status.as_str())
        .bind(&updated.updated_at)
        .bind(updated.version)
        .bind(id)
        .bind(existing.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: existing.version,
            });
        }

        insert_audit(
            &mut tx,
            Some(actor_id),
            "update",
            "commander",
            id,
            json!({
                "status": { "from": existing.status, "to": updated.status },
                "state": { "from": existing.state, "to": updated.state },
            }),
        )
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Delete a commander who has never been assigned anything.
    pub async fn delete_commander(&self, id: &str, actor_id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let referenced: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM assignments WHERE commander_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?
                .get("n");

        if referenced > 0 {
            return Err(AppError::Validation(
                "Commander has assignment history; mark them inactive instead".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM commanders WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Commander {} not found", id)));
        }

        insert_audit(&mut tx, Some(actor_id), "delete", "commander", id, json!({})).await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

pub(super) async fn fetch_commander(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Commander>, AppError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM commanders WHERE id = ?",
        COMMANDER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(commander_from_row))
}

fn commander_from_row(row: &sqlx::sqlite::SqliteRow) -> Commander {
    let status: String = row.get("status");
    Commander {
        id: row.get("id"),
        name: row.get("name"),
        rank: row.get("rank"),
        state: row.get("state"),
        unit: row.get("unit"),
        phone: row.get("phone"),
        email: row.get("email"),
        user_id: row.get("user_id"),
        status: CommanderStatus::parse(&status).unwrap_or(CommanderStatus::Inactive),
        active_assignments: row.get("active_assignments"),
        resolved_assignments: row.get("resolved_assignments"),
        total_assignments: row.get("total_assignments"),
        success_rate: row.get("success_rate"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}
