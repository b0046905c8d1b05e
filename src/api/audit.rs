//! Audit trail viewer endpoints (admin only).

use axum::{
    extract::{Query, State},
    Extension,
};

use super::{error, success, ApiResult};
use crate::auth::CurrentUser;
use crate::models::{AccessLog, AuditEntry, AuditLog, AuditQuery, Role};
use crate::AppState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

fn effective_limit(query: &AuditQuery) -> usize {
    query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// GET /api/audit - Change and access history merged, newest first.
pub async fn get_audit_trail(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AuditEntry>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }

    match state
        .repo
        .audit_trail(
            effective_limit(&query),
            query.entity_type.as_deref(),
            query.entity_id.as_deref(),
        )
        .await
    {
        Ok(entries) => success(entries, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/audit/changes
pub async fn list_audit_changes(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AuditLog>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }

    match state
        .repo
        .list_audit_logs(
            effective_limit(&query),
            query.entity_type.as_deref(),
            query.entity_id.as_deref(),
        )
        .await
    {
        Ok(logs) => success(logs, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/audit/access
pub async fn list_access_logs(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AccessLog>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }

    match state.repo.list_access_logs(effective_limit(&query)).await {
        Ok(logs) => success(logs, revision_id),
        Err(e) => error(e, revision_id),
    }
}
