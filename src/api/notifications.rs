//! In-app notifications for the signed-in operator.

use axum::{
    extract::{Path, State},
    Extension,
};

use super::{error, success, ApiResult};
use crate::auth::CurrentUser;
use crate::models::Notification;
use crate::AppState;

const NOTIFICATION_LIMIT: usize = 50;

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Vec<Notification>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .list_notifications(current.id(), NOTIFICATION_LIMIT)
        .await
    {
        Ok(notifications) => success(notifications, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.mark_notification_read(&id, current.id()).await {
        Ok(()) => success((), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/notifications/read-all - Returns how many were marked.
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<u64> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.mark_all_read(current.id()).await {
        Ok(count) => success(count, revision_id),
        Err(e) => error(e, revision_id),
    }
}
