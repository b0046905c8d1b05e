//! Report triage endpoints for the back office.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::assignments::linked_commander_id;
use super::{error, success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::filters::{eligible_commanders, ReportQuery};
use crate::models::{
    Assignment, Commander, Report, ReportDetail, Role, UpdateReportRequest, UpdateReportStatusRequest,
};
use crate::realtime::ChangeAction;
use crate::search::MAX_SEARCH_WINDOW;
use crate::AppState;

const TRIAGE_ROLES: [Role; 2] = [Role::Admin, Role::Analyst];

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    /// Hits matching the query across all pages.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub report: Report,
    pub score: f32,
}

/// Assignments held by a commander caller. `None` for roles that see every report.
async fn commander_scope(
    state: &AppState,
    current: &CurrentUser,
) -> Result<Option<(Option<String>, Vec<Assignment>)>, AppError> {
    if !current.is_commander() {
        return Ok(None);
    }
    match linked_commander_id(state, current).await? {
        Some(commander_id) => {
            let held = state.repo.assignments_for_commander(&commander_id).await?;
            Ok(Some((Some(commander_id), held)))
        }
        None => Ok(Some((None, Vec::new()))),
    }
}

/// GET /api/reports - List reports, newest first, narrowed by the filter query.
/// Commanders only see reports they have been assigned.
pub async fn list_reports(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Vec<Report>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let filter = match query.filter() {
        Ok(filter) => filter,
        Err(e) => return error(e, revision_id),
    };
    let scope = match commander_scope(&state, &current).await {
        Ok(scope) => scope,
        Err(e) => return error(e, revision_id),
    };

    match state.repo.list_reports().await {
        Ok(reports) => {
            let mut reports = filter.apply(reports);
            if let Some((_, held)) = scope {
                let ids: HashSet<&str> = held.iter().map(|a| a.report_id.as_str()).collect();
                reports.retain(|r| ids.contains(r.id.as_str()));
            }
            success(reports, revision_id)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/reports/search - Full-text search over reports.
pub async fn search_reports(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&TRIAGE_ROLES) {
        return error(e, revision_id);
    }

    let limit = params.limit.clamp(1, MAX_SEARCH_LIMIT);
    let offset = params.offset.min(MAX_SEARCH_WINDOW - limit);

    let page = match state.search.search(&params.q, limit, offset) {
        Ok(page) => page,
        Err(e) => return error(e, revision_id),
    };

    let mut results = Vec::with_capacity(page.hits.len());
    for hit in page.hits {
        match state.repo.get_report(&hit.report_id).await {
            Ok(Some(report)) => results.push(SearchResultItem {
                report,
                score: hit.score,
            }),
            // Index can briefly lag a delete
            Ok(None) => continue,
            Err(e) => return error(e, revision_id),
        }
    }

    success(
        SearchResponse {
            results,
            total: page.total,
            limit,
            offset,
        },
        revision_id,
    )
}

/// GET /api/reports/:id - A report with its assignment history.
/// Commanders see only reports they hold and only their own assignments on them.
pub async fn get_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<ReportDetail> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let not_found = || AppError::NotFound(format!("Report {} not found", id));

    let scope = match commander_scope(&state, &current).await {
        Ok(scope) => scope,
        Err(e) => return error(e, revision_id),
    };
    if let Some((_, held)) = &scope {
        if !held.iter().any(|a| a.report_id == id) {
            return error(not_found(), revision_id);
        }
    }

    match state.repo.report_detail(&id).await {
        Ok(Some(mut detail)) => {
            if let Some((commander_id, _)) = scope {
                detail
                    .assignments
                    .retain(|a| Some(&a.commander_id) == commander_id.as_ref());
            }
            success(detail, revision_id)
        }
        Ok(None) => error(not_found(), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/reports/:id - Edit triage fields.
pub async fn update_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(request): Json<UpdateReportRequest>,
) -> ApiResult<Report> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&TRIAGE_ROLES) {
        return error(e, revision_id);
    }
    if request.location.as_deref().is_some_and(|l| l.trim().is_empty()) {
        return error(
            AppError::Validation("Location cannot be blank".to_string()),
            revision_id,
        );
    }

    match state.repo.update_report(&id, &request, current.id()).await {
        Ok(report) => {
            if let Err(e) = state.search.index_report(&report).await {
                tracing::warn!("Failed to re-index report: {}", e);
            }

            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .feed
                .publish("reports", ChangeAction::Update, &report.id, new_revision);
            success(report, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/reports/:id/status - Reject, reopen or close a report.
pub async fn update_report_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(request): Json<UpdateReportStatusRequest>,
) -> ApiResult<Report> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&TRIAGE_ROLES) {
        return error(e, revision_id);
    }

    match state
        .repo
        .update_report_status(&id, &request, current.id())
        .await
    {
        Ok(report) => {
            tracing::info!(
                report_id = %report.id,
                status = report.status.as_str(),
                actor = current.id(),
                "Report status changed"
            );
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .feed
                .publish("reports", ChangeAction::Update, &report.id, new_revision);
            success(report, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/reports/:id - Remove a report and its closed assignments.
pub async fn delete_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }

    match state.repo.delete_report(&id, current.id()).await {
        Ok(()) => {
            if let Err(e) = state.search.remove_report(&id).await {
                tracing::warn!("Failed to remove report from index: {}", e);
            }

            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .feed
                .publish("reports", ChangeAction::Delete, &id, new_revision);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/reports/:id/eligible-commanders - Who can take this report.
pub async fn list_eligible_commanders(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Commander>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }

    let report = match state.repo.get_report(&id).await {
        Ok(Some(report)) => report,
        Ok(None) => {
            return error(
                AppError::NotFound(format!("Report {} not found", id)),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    };

    match state.repo.list_commanders().await {
        Ok(commanders) => success(eligible_commanders(&commanders, &report.state), revision_id),
        Err(e) => error(e, revision_id),
    }
}
