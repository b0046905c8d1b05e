//! Assignment persistence and the report → commander → resolution workflow.
//!
//! Each step touches the assignment, its report and the commander's counters
//! in one transaction. Counters are adjusted with SQL arithmetic so concurrent
//! dashboards cannot lose increments.

use serde_json::json;
use sqlx::{Row, SqliteConnection};

use super::commanders::fetch_commander;
use super::reports::{fetch_report, set_report_status};
use super::repository::{
    bump_revision, insert_audit, insert_notification, new_id, now_timestamp,
    refresh_success_rate, Repository,
};
use crate::errors::AppError;
use crate::models::{
    Assignment, AssignmentQuery, AssignmentStatus, AssignmentWithReport, CommanderDashboard,
    CommanderStatus, CreateAssignmentRequest, NewNotification, ReportDetail, ReportStatus,
    Resolution,
};

const RECENT_RESOLVED_LIMIT: usize = 10;

const ASSIGNMENT_COLUMNS: &str = r#"id, report_id, commander_id, status, assigned_by, notes,
    resolution, assigned_at, accepted_at, resolved_at, updated_at"#;

impl Repository {
    /// List assignments, newest first, narrowed by the optional query fields.
    pub async fn list_assignments(&self, query: &AssignmentQuery) -> Result<Vec<Assignment>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM assignments ORDER BY assigned_at DESC",
            ASSIGNMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(assignment_from_row)
            .filter(|a| query.status.map_or(true, |s| a.status == s))
            .filter(|a| {
                query
                    .commander_id
                    .as_deref()
                    .map_or(true, |c| a.commander_id == c)
            })
            .filter(|a| query.report_id.as_deref().map_or(true, |r| a.report_id == r))
            .collect())
    }

    pub async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_assignment(&mut conn, id).await
    }

    pub async fn assignments_for_commander(&self, commander_id: &str) -> Result<Vec<Assignment>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM assignments WHERE commander_id = ? ORDER BY assigned_at DESC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(commander_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(assignment_from_row).collect())
    }

    /// A report together with its assignment history, newest first.
    pub async fn report_detail(&self, report_id: &str) -> Result<Option<ReportDetail>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let Some(report) = fetch_report(&mut conn, report_id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(&format!(
            "SELECT {} FROM assignments WHERE report_id = ? ORDER BY assigned_at DESC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(report_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(ReportDetail {
            report,
            assignments: rows.iter().map(assignment_from_row).collect(),
        }))
    }

    /// Open work plus the most recent resolutions for one commander.
    pub async fn commander_dashboard(&self, commander_id: &str) -> Result<Option<CommanderDashboard>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let Some(commander) = fetch_commander(&mut conn, commander_id).await? else {
            return Ok(None);
        };

        let mut open_assignments = Vec::new();
        let mut recent_resolved = Vec::new();
        for assignment in self.assignments_for_commander(commander_id).await? {
            let bucket = match assignment.status {
                AssignmentStatus::Pending | AssignmentStatus::Accepted => &mut open_assignments,
                AssignmentStatus::Resolved if recent_resolved.len() < RECENT_RESOLVED_LIMIT => {
                    &mut recent_resolved
                }
                _ => continue,
            };
            let report = fetch_report(&mut conn, &assignment.report_id).await?;
            bucket.push(AssignmentWithReport { assignment, report });
        }

        Ok(Some(CommanderDashboard {
            commander,
            open_assignments,
            recent_resolved,
        }))
    }

    /// Assign a pending report to an active commander serving the report's state.
    pub async fn assign_report(
        &self,
        request: &CreateAssignmentRequest,
        actor_id: &str,
    ) -> Result<Assignment, AppError> {
        let mut tx = self.pool.begin().await?;

        let report = fetch_report(&mut tx, &request.report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", request.report_id)))?;

        let commander = fetch_commander(&mut tx, &request.commander_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Commander {} not found", request.commander_id))
            })?;

        if report.status != ReportStatus::Pending {
            return Err(AppError::Validation(format!(
                "Report is {} and cannot be assigned",
                report.status.as_str()
            )));
        }
        if commander.status != CommanderStatus::Active {
            return Err(AppError::Validation(format!(
                "Commander {} is not on active duty",
                commander.name
            )));
        }
        if !commander.state.eq_ignore_ascii_case(&report.state) {
            return Err(AppError::Validation(format!(
                "Commander {} serves {}, report is in {}",
                commander.name, commander.state, report.state
            )));
        }
        if count_open_for_report(&mut tx, &report.id).await? > 0 {
            return Err(AppError::Validation(
                "Report already has an open assignment".to_string(),
            ));
        }

        let now = now_timestamp();
        let assignment = Assignment {
            id: new_id(),
            report_id: report.id.clone(),
            commander_id: commander.id.clone(),
            status: AssignmentStatus::Pending,
            assigned_by: actor_id.to_string(),
            notes: request.notes.clone(),
            resolution: None,
            assigned_at: now.clone(),
            accepted_at: None,
            resolved_at: None,
            updated_at: now,
        };

        sqlx::query(&format!(
            "INSERT INTO assignments ({}) VALUES (?, ?, ?, ?, ?, ?, NULL, ?, NULL, NULL, ?)",
            ASSIGNMENT_COLUMNS
        ))
        .bind(&assignment.id)
        .bind(&assignment.report_id)
        .bind(&assignment.commander_id)
        .bind(assignment.status.as_str())
        .bind(&assignment.assigned_by)
        .bind(&assignment.notes)
        .bind(&assignment.assigned_at)
        .bind(&assignment.updated_at)
        .execute(&mut *tx)
        .await?;

        set_report_status(&mut tx, &report, ReportStatus::Assigned).await?;

        sqlx::query(
            r#"UPDATE commanders SET active_assignments = active_assignments + 1,
                   total_assignments = total_assignments + 1, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&assignment.assigned_at)
        .bind(&commander.id)
        .execute(&mut *tx)
        .await?;
        refresh_success_rate(&mut tx, &commander.id).await?;

        insert_audit(
            &mut tx,
            Some(actor_id),
            "assign",
            "report",
            &report.id,
            json!({
                "assignmentId": assignment.id,
                "commanderId": commander.id,
                "commanderName": commander.name,
            }),
        )
        .await?;

        if let Some(user_id) = &commander.user_id {
            insert_notification(
                &mut tx,
                &NewNotification {
                    user_id: user_id.clone(),
                    title: format!("New {} assignment", report.priority.as_str()),
                    message: format!(
                        "{} at {}, {}",
                        report.threat_type.as_str(),
                        report.location,
                        report.state
                    ),
                    entity_type: Some("assignment".to_string()),
                    entity_id: Some(assignment.id.clone()),
                },
            )
            .await?;
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(
            assignment_id = %assignment.id,
            report_id = %assignment.report_id,
            commander_id = %assignment.commander_id,
            "Report assigned"
        );

        Ok(assignment)
    }

    /// Commander acknowledges a pending assignment; the report goes in progress.
    pub async fn accept_assignment(&self, id: &str, actor_id: &str) -> Result<Assignment, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_assignment(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))?;

        if existing.status != AssignmentStatus::Pending {
            return Err(AppError::Validation(format!(
                "Assignment is {} and cannot be accepted",
                existing.status.as_str()
            )));
        }

        let now = now_timestamp();
        sqlx::query(
            "UPDATE assignments SET status = 'accepted', accepted_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let report = fetch_report(&mut tx, &existing.report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", existing.report_id)))?;
        set_report_status(&mut tx, &report, ReportStatus::InProgress).await?;

        insert_audit(
            &mut tx,
            Some(actor_id),
            "accept",
            "assignment",
            id,
            json!({ "reportId": existing.report_id }),
        )
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(Assignment {
            status: AssignmentStatus::Accepted,
            accepted_at: Some(now.clone()),
            updated_at: now,
            ..existing
        })
    }

    /// Close an open assignment with its resolution notes and evidence links.
    pub async fn resolve_assignment(
        &self,
        id: &str,
        resolution: &Resolution,
        actor_id: &str,
    ) -> Result<Assignment, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_assignment(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))?;

        if !existing.status.is_open() {
            return Err(AppError::Validation(format!(
                "Assignment is {} and cannot be resolved",
                existing.status.as_str()
            )));
        }

        let now = now_timestamp();
        let resolution_json = serde_json::to_string(resolution)?;
        sqlx::query(
            "UPDATE assignments SET status = 'resolved', resolution = ?, resolved_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&resolution_json)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let report = fetch_report(&mut tx, &existing.report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", existing.report_id)))?;
        set_report_status(&mut tx, &report, ReportStatus::Resolved).await?;

        sqlx::query(
            r#"UPDATE commanders SET active_assignments = MAX(active_assignments - 1, 0),
                   resolved_assignments = resolved_assignments + 1, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&now)
        .bind(&existing.commander_id)
        .execute(&mut *tx)
        .await?;
        refresh_success_rate(&mut tx, &existing.commander_id).await?;

        insert_audit(
            &mut tx,
            Some(actor_id),
            "resolve",
            "assignment",
            id,
            json!({
                "reportId": existing.report_id,
                "outcome": resolution.outcome,
                "evidenceCount": resolution.evidence_urls.len(),
            }),
        )
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(assignment_id = %id, report_id = %existing.report_id, "Assignment resolved");

        Ok(Assignment {
            status: AssignmentStatus::Resolved,
            resolution: Some(resolution.clone()),
            resolved_at: Some(now.clone()),
            updated_at: now,
            ..existing
        })
    }

    /// Withdraw an open assignment; the report returns to the pending queue.
    pub async fn cancel_assignment(
        &self,
        id: &str,
        reason: Option<&str>,
        actor_id: &str,
    ) -> Result<Assignment, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_assignment(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))?;

        if !existing.status.is_open() {
            return Err(AppError::Validation(format!(
                "Assignment is {} and cannot be cancelled",
                existing.status.as_str()
            )));
        }

        let now = now_timestamp();
        sqlx::query("UPDATE assignments SET status = 'cancelled', updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let report = fetch_report(&mut tx, &existing.report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", existing.report_id)))?;
        set_report_status(&mut tx, &report, ReportStatus::Pending).await?;

        sqlx::query(
            "UPDATE commanders SET active_assignments = MAX(active_assignments - 1, 0), updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(&existing.commander_id)
        .execute(&mut *tx)
        .await?;
        refresh_success_rate(&mut tx, &existing.commander_id).await?;

        insert_audit(
            &mut tx,
            Some(actor_id),
            "cancel",
            "assignment",
            id,
            json!({ "reportId": existing.report_id, "reason": reason }),
        )
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(Assignment {
            status: AssignmentStatus::Cancelled,
            updated_at: now,
            ..existing
        })
    }
}

async fn count_open_for_report(conn: &mut SqliteConnection, report_id: &str) -> Result<i64, AppError> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM assignments WHERE report_id = ? AND status IN ('pending', 'accepted')",
    )
    .bind(report_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get("n"))
}

async fn fetch_assignment(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Assignment>, AppError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM assignments WHERE id = ?",
        ASSIGNMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(assignment_from_row))
}

fn assignment_from_row(row: &sqlx::sqlite::SqliteRow) -> Assignment {
    let status: String = row.get("status");
    let resolution: Option<String> = row.get("resolution");
    Assignment {
        id: row.get("id"),
        report_id: row.get("report_id"),
        commander_id: row.get("commander_id"),
        status: AssignmentStatus::parse(&status).unwrap_or(AssignmentStatus::Pending),
        assigned_by: row.get("assigned_by"),
        notes: row.get("notes"),
        resolution: resolution.and_then(|s| serde_json::from_str(&s).ok()),
        assigned_at: row.get("assigned_at"),
        accepted_at: row.get("accepted_at"),
        resolved_at: row.get("resolved_at"),
        updated_at: row.get("updated_at"),
    }
}
