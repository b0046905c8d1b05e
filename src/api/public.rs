//! Citizen-facing endpoints. No session required.

use axum::{
    extract::{multipart::Multipart, Path, State},
    Json,
};

use super::media::{store_all, MultipartForm};
use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateReportRequest, ReportTracking};
use crate::realtime::ChangeAction;
use crate::storage::{StoredObject, REPORT_MEDIA_BUCKET};
use crate::validation::{canonical_state, validate_new_report};
use crate::AppState;

/// POST /public/reports - Submit an incident report.
pub async fn submit_report(
    State(state): State<AppState>,
    Json(request): Json<CreateReportRequest>,
) -> ApiResult<ReportTracking> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(message) = validate_new_report(&request) {
        return error(AppError::Validation(message), revision_id);
    }
    let Some(state_name) = canonical_state(&request.state) else {
        return error(
            AppError::Validation(format!("Unknown state {}", request.state)),
            revision_id,
        );
    };

    match state.repo.create_report(&request, state_name).await {
        Ok(report) => {
            if let Err(e) = state.search.index_report(&report).await {
                tracing::warn!("Failed to index report: {}", e);
            }

            tracing::info!(
                report_id = %report.id,
                state = %report.state,
                threat = report.threat_type.as_str(),
                "Report submitted"
            );

            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .feed
                .publish("reports", ChangeAction::Insert, &report.id, new_revision);
            success(ReportTracking::from(&report), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /public/reports/:id - Tracking view for the reporter.
pub async fn track_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ReportTracking> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_report(&id).await {
        Ok(Some(report)) => success(ReportTracking::from(&report), revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Report {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /public/media - Upload photos, video or audio ahead of a submission.
pub async fn upload_report_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Vec<StoredObject>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let form = match MultipartForm::read(&mut multipart).await {
        Ok(form) => form,
        Err(e) => return error(e, revision_id),
    };
    if form.files.is_empty() {
        return error(
            AppError::Validation("No files were uploaded".to_string()),
            revision_id,
        );
    }

    match store_all(&state.media, REPORT_MEDIA_BUCKET, &form.files).await {
        Ok(objects) => success(objects, revision_id),
        Err(e) => error(e, revision_id),
    }
}
