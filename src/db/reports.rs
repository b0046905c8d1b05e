//! Report persistence.

use serde_json::json;
use sqlx::{Row, SqliteConnection};

use super::repository::{
    bump_revision, insert_audit, insert_notification, new_id, now_timestamp, parse_json_array,
    to_json_array, version_mismatch, Repository,
};
use crate::errors::AppError;
use crate::models::{
    CreateReportRequest, NewNotification, Priority, Report, ReportStatus, ThreatType,
    UpdateReportRequest, UpdateReportStatusRequest,
};

const REPORT_COLUMNS: &str = r#"id, description, location, state, lga, latitude, longitude,
    threat_type, priority, status, media_urls, reporter_name, reporter_phone, reporter_email,
    is_anonymous, created_at, updated_at, version"#;

impl Repository {
    /// List all reports, newest first.
    pub async fn list_reports(&self) -> Result<Vec<Report>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reports ORDER BY created_at DESC",
            REPORT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(report_from_row).collect())
    }

    /// Get a report by ID.
    pub async fn get_report(&self, id: &str) -> Result<Option<Report>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_report(&mut conn, id).await
    }

    /// Store a citizen submission and alert every active administrator.
    ///
    /// `state` is the canonical state name resolved by the caller.
    pub async fn create_report(
        &self,
        request: &CreateReportRequest,
        state: &str,
    ) -> Result<Report, AppError> {
        let id = new_id();
        let now = now_timestamp();
        let report = Report {
            id: id.clone(),
            description: request.description.trim().to_string(),
            location: request.location.trim().to_string(),
            state: state.to_string(),
            lga: request.lga.clone(),
            latitude: request.latitude,
            longitude: request.longitude,
            threat_type: request.threat_type,
            priority: request.priority,
            status: ReportStatus::Pending,
            media_urls: request.media_urls.clone(),
            reporter_name: request.reporter_name.clone(),
            reporter_phone: request.reporter_phone.clone(),
            reporter_email: request.reporter_email.clone(),
            is_anonymous: request.is_anonymous,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO reports ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
            REPORT_COLUMNS
        ))
        .bind(&report.id)
        .bind(&report.description)
        .bind(&report.location)
        .bind(&report.state)
        .bind(&report.lga)
        .bind(report.latitude)
        .bind(report.longitude)
        .bind(report.threat_type.as_str())
        .bind(report.priority.as_str())
        .bind(report.status.as_str())
        .bind(to_json_array(&report.media_urls))
        .bind(&report.reporter_name)
        .bind(&report.reporter_phone)
        .bind(&report.reporter_email)
        .bind(report.is_anonymous as i32)
        .bind(&report.created_at)
        .bind(&report.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_audit(
            &mut tx,
            None,
            "submit",
            "report",
            &id,
            json!({
                "state": report.state,
                "threatType": report.threat_type,
                "priority": report.priority,
            }),
        )
        .await?;

        let admins = sqlx::query("SELECT id FROM users WHERE role = 'admin' AND active = 1")
            .fetch_all(&mut *tx)
            .await?;
        for admin in admins {
            insert_notification(
                &mut tx,
                &NewNotification {
                    user_id: admin.get("id"),
                    title: format!("New {} report", report.priority.as_str()),
                    message: format!(
                        "{} reported at {}, {}",
                        report.threat_type.as_str(),
                        report.location,
                        report.state
                    ),
                    entity_type: Some("report".to_string()),
                    entity_id: Some(id.clone()),
                },
            )
            .await?;
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(report)
    }

    /// Edit triage fields with optimistic concurrency control.
    pub async fn update_report(
        &self,
        id: &str,
        request: &UpdateReportRequest,
        actor_id: &str,
    ) -> Result<Report, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_report(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", id)))?;

        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(version_mismatch(expected, existing.version));
            }
        }

        let now = now_timestamp();
        let updated = Report {
            priority: request.priority.unwrap_or(existing.priority),
            threat_type: request.threat_type.unwrap_or(existing.threat_type),
            location: request
                .location
                .as_ref()
                .map(|l| l.trim().to_string())
                .unwrap_or(existing.location.clone()),
            lga: request.lga.clone().or(existing.lga.clone()),
            updated_at: now,
            version: existing.version + 1,
            ..existing.clone()
        };

        let result = sqlx::query(
            "UPDATE reports SET priority = ?, threat_type = ?, location = ?, lga = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(updated.priority.as_str())
        .bind(updated.threat_type.as_str())
        .bind(&updated.location)
        .bind(&updated.lga)
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
            "report",
            id,
            json!({
                "priority": { "from": existing.priority, "to": updated.priority },
                "threatType": { "from": existing.threat_type, "to": updated.threat_type },
                "location": { "from": existing.location, "to": updated.location },
            }),
        )
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Apply an operator-driven status change (reject, reopen, close).
    pub async fn update_report_status(
        &self,
        id: &str,
        request: &UpdateReportStatusRequest,
        actor_id: &str,
    ) -> Result<Report, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = fetch_report(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", id)))?;

        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(version_mismatch(expected, existing.version));
            }
        }

        if !existing.status.is_manual_transition(request.status) {
            return Err(AppError::Validation(format!(
                "Cannot change report status from {} to {}",
                existing.status.as_str(),
                request.status.as_str()
            )));
        }

        let updated = set_report_status(&mut tx, &existing, request.status).await?;

        insert_audit(
            &mut tx,
            Some(actor_id),
            "status_change",
            "report",
            id,
            json!({
                "from": existing.status,
                "to": request.status,
                "reason": request.reason,
            }),
        )
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Delete a report and its assignment history. Refused while an assignment is open.
    pub async fn delete_report(&self, id: &str, actor_id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let open: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM assignments WHERE report_id = ? AND status IN ('pending', 'accepted')",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?
        .get("n");

        if open > 0 {
            return Err(AppError::Validation(
                "Cancel the open assignment before deleting this report".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Report {} not found", id)));
        }

        insert_audit(&mut tx, Some(actor_id), "delete", "report", id, json!({})).await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

pub(super) async fn fetch_report(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Report>, AppError> {
    let row = sqlx::query(&format!("SELECT {} FROM reports WHERE id = ?", REPORT_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(report_from_row))
}

/// Move a report to `next`, enforcing the lifecycle graph and bumping its version.
pub(super) async fn set_report_status(
    conn: &mut SqliteConnection,
    existing: &Report,
    next: ReportStatus,
) -> Result<Report, AppError> {
    if !existing.status.can_transition_to(next) {
        return Err(AppError::Validation(format!(
            "Report {} cannot move from {} to {}",
            existing.id,
            existing.status.as_str(),
            next.as_str()
        )));
    }

    let now = now_timestamp();
    let result = sqlx::query(
        "UPDATE reports SET status = ?, updated_at = ?, version = version + 1 WHERE id = ? AND version = ?",
    )
    .bind(next.as_str())
    .bind(&now)
    .bind(&existing.id)
    .bind(existing.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict {
            message: "Concurrent modification detected".to_string(),
            current_version: existing.version,
        });
    }

    Ok(Report {
        status: next,
        updated_at: now,
        version: existing.version + 1,
        ..existing.clone()
    })
}

fn report_from_row(row: &sqlx::sqlite::SqliteRow) -> Report {
    let is_anonymous: i32 = row.get("is_anonymous");
    let media_urls: Option<String> = row.get("media_urls");
    let threat_type: String = row.get("threat_type");
    let priority: String = row.get("priority");
    let status: String = row.get("status");

    Report {
        id: row.get("id"),
        description: row.get("description"),
        location: row.get("location"),
        state: row.get("state"),
        lga: row.get("lga"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        threat_type: ThreatType::parse(&threat_type).unwrap_or(ThreatType::Other),
        priority: Priority::parse(&priority).unwrap_or(Priority::Medium),
        status: ReportStatus::parse(&status).unwrap_or(ReportStatus::Pending),
        media_urls: media_urls.map(|s| parse_json_array(&s)).unwrap_or_default(),
        reporter_name: row.get("reporter_name"),
        reporter_phone: row.get("reporter_phone"),
        reporter_email: row.get("reporter_email"),
        is_anonymous: is_anonymous != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}
