//! Assignment workflow endpoints.
//!
//! Admins assign and cancel. The commander linked to an assignment (or an admin)
//! accepts and resolves it. Analysts have read access.

use axum::{
    extract::{multipart::Multipart, Path, Query, State},
    Extension, Json,
};

use super::media::{remove_all, store_all, MultipartForm};
use super::{error, success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    Assignment, AssignmentQuery, CancelAssignmentRequest, CreateAssignmentRequest, Resolution,
    ResolveAssignmentRequest, Role,
};
use crate::realtime::ChangeAction;
use crate::storage::EVIDENCE_BUCKET;
use crate::AppState;

const RESOLUTION_PART: &str = "resolution";
const EVIDENCE_PART: &str = "evidence";

/// The commander id linked to the caller, if any.
pub(super) async fn linked_commander_id(state: &AppState, current: &CurrentUser) -> Result<Option<String>, AppError> {
    if !current.is_commander() {
        return Ok(None);
    }
    Ok(state
        .repo
        .find_commander_by_user(current.id())
        .await?
        .map(|c| c.id))
}

/// Load an assignment the caller may view. Commanders only see their own.
async fn load_visible(state: &AppState, current: &CurrentUser, id: &str) -> Result<Assignment, AppError> {
    let assignment = state
        .repo
        .get_assignment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))?;

    if current.is_commander() {
        let own = linked_commander_id(state, current).await?;
        if own.as_deref() != Some(assignment.commander_id.as_str()) {
            // Hide other commanders' work entirely
            return Err(AppError::NotFound(format!("Assignment {} not found", id)));
        }
    }
    Ok(assignment)
}

/// Load an assignment the caller may act on: admins, or the assigned commander.
async fn load_actionable(state: &AppState, current: &CurrentUser, id: &str) -> Result<Assignment, AppError> {
    current.require_role(&[Role::Admin, Role::Commander])?;
    load_visible(state, current, id).await
}

fn publish_workflow(state: &AppState, assignment: &Assignment, action: ChangeAction, revision_id: i64) {
    state
        .feed
        .publish("assignments", action, &assignment.id, revision_id);
    state
        .feed
        .publish("reports", ChangeAction::Update, &assignment.report_id, revision_id);
    state
        .feed
        .publish("commanders", ChangeAction::Update, &assignment.commander_id, revision_id);
}

/// GET /api/assignments - List assignments. Commanders see only their own.
pub async fn list_assignments(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(mut query): Query<AssignmentQuery>,
) -> ApiResult<Vec<Assignment>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if current.is_commander() {
        match linked_commander_id(&state, &current).await {
            Ok(Some(commander_id)) => query.commander_id = Some(commander_id),
            Ok(None) => return success(Vec::new(), revision_id),
            Err(e) => return error(e, revision_id),
        }
    }

    match state.repo.list_assignments(&query).await {
        Ok(assignments) => success(assignments, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/assignments/:id
pub async fn get_assignment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Assignment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match load_visible(&state, &current, &id).await {
        Ok(assignment) => success(assignment, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/assignments - Assign a pending report to a commander.
pub async fn create_assignment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateAssignmentRequest>,
) -> ApiResult<Assignment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }

    match state.repo.assign_report(&request, current.id()).await {
        Ok(assignment) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            publish_workflow(&state, &assignment, ChangeAction::Insert, new_revision);
            success(assignment, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/assignments/:id/accept
pub async fn accept_assignment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Assignment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = load_actionable(&state, &current, &id).await {
        return error(e, revision_id);
    }

    match state.repo.accept_assignment(&id, current.id()).await {
        Ok(assignment) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            publish_workflow(&state, &assignment, ChangeAction::Update, new_revision);
            success(assignment, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/assignments/:id/resolve - Multipart: a `resolution` JSON part and
/// any number of `evidence` files.
pub async fn resolve_assignment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Assignment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match load_actionable(&state, &current, &id).await {
        Ok(assignment) if !assignment.status.is_open() => {
            return error(
                AppError::Validation(format!(
                    "Assignment is {} and cannot be resolved",
                    assignment.status.as_str()
                )),
                revision_id,
            )
        }
        Ok(_) => {}
        Err(e) => return error(e, revision_id),
    }

    let form = match MultipartForm::read(&mut multipart).await {
        Ok(form) => form,
        Err(e) => return error(e, revision_id),
    };

    let request: ResolveAssignmentRequest = match form.text(RESOLUTION_PART) {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(request) => request,
            Err(e) => {
                return error(
                    AppError::Validation(format!("Invalid resolution: {}", e)),
                    revision_id,
                )
            }
        },
        None => {
            return error(
                AppError::Validation("Missing resolution part".to_string()),
                revision_id,
            )
        }
    };
    if request.summary.trim().is_empty() {
        return error(
            AppError::Validation("Resolution summary is required".to_string()),
            revision_id,
        );
    }

    let evidence = match store_all(&state.media, EVIDENCE_BUCKET, form.files_named(EVIDENCE_PART)).await {
        Ok(evidence) => evidence,
        Err(e) => return error(e, revision_id),
    };

    let resolution = Resolution {
        summary: request.summary.trim().to_string(),
        outcome: request.outcome,
        actions_taken: request.actions_taken,
        casualties: request.casualties,
        arrests: request.arrests,
        evidence_urls: evidence.iter().map(|o| o.url.clone()).collect(),
        resolved_by: current.id().to_string(),
    };

    match state.repo.resolve_assignment(&id, &resolution, current.id()).await {
        Ok(assignment) => {
            tracing::info!(
                assignment_id = %assignment.id,
                report_id = %assignment.report_id,
                evidence = evidence.len(),
                "Assignment resolved"
            );
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            publish_workflow(&state, &assignment, ChangeAction::Update, new_revision);
            success(assignment, new_revision)
        }
        Err(e) => {
            remove_all(&state.media, &evidence).await;
            error(e, revision_id)
        }
    }
}

/// POST /api/assignments/:id/cancel - Withdraw an open assignment.
pub async fn cancel_assignment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(request): Json<CancelAssignmentRequest>,
) -> ApiResult<Assignment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }

    match state
        .repo
        .cancel_assignment(&id, request.reason.as_deref(), current.id())
        .await
    {
        Ok(assignment) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            publish_workflow(&state, &assignment, ChangeAction::Update, new_revision);
            success(assignment, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
