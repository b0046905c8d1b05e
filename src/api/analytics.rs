//! Analytics endpoint.

use axum::{
    extract::{Query, State},
    Extension,
};
use chrono::Utc;

use super::{error, success, ApiResult};
use crate::analytics::{build_report, AnalyticsQuery, AnalyticsReport};
use crate::auth::CurrentUser;
use crate::models::{AssignmentQuery, Role};
use crate::AppState;

/// GET /api/analytics - Aggregates over the filtered report set.
pub async fn get_analytics(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<AnalyticsReport> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin, Role::Analyst]) {
        return error(e, revision_id);
    }

    let filter = match query.filter() {
        Ok(filter) => filter,
        Err(e) => return error(e, revision_id),
    };
    let reports = match state.repo.list_reports().await {
        Ok(reports) => filter.apply(reports),
        Err(e) => return error(e, revision_id),
    };
    let assignments = match state.repo.list_assignments(&AssignmentQuery::default()).await {
        Ok(assignments) => assignments,
        Err(e) => return error(e, revision_id),
    };
    let commanders = match state.repo.list_commanders().await {
        Ok(commanders) => commanders,
        Err(e) => return error(e, revision_id),
    };

    success(
        build_report(
            &reports,
            &assignments,
            &commanders,
            query.trend_days(),
            Utc::now().date_naive(),
        ),
        revision_id,
    )
}
