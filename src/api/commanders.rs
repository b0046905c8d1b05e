//! Commander roster and dashboards.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use super::{error, success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    Commander, CommanderDashboard, CommanderStatus, CreateCommanderRequest, Role,
    UpdateCommanderRequest,
};
use crate::realtime::ChangeAction;
use crate::validation::{canonical_state, validate_email, validate_phone};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CommanderQuery {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status: Option<CommanderStatus>,
}

fn check_contact(phone: Option<&str>, email: Option<&str>) -> Result<(), AppError> {
    if let Some(phone) = phone {
        if !validate_phone(phone) {
            return Err(AppError::Validation(format!("Invalid phone number {}", phone)));
        }
    }
    if let Some(email) = email {
        if !validate_email(email) {
            return Err(AppError::Validation(format!("Invalid email {}", email)));
        }
    }
    Ok(())
}

fn resolve_state(name: &str) -> Result<&'static str, AppError> {
    canonical_state(name).ok_or_else(|| AppError::Validation(format!("Unknown state {}", name)))
}

/// A linked account must exist and carry the commander role.
async fn check_linked_user(state: &AppState, user_id: Option<&str>) -> Result<(), AppError> {
    let Some(user_id) = user_id else {
        return Ok(());
    };
    match state.repo.get_user(user_id).await? {
        Some(user) if user.role == Role::Commander => Ok(()),
        Some(_) => Err(AppError::Validation(
            "Linked account must have the commander role".to_string(),
        )),
        None => Err(AppError::Validation(format!("User {} not found", user_id))),
    }
}

/// GET /api/commanders - Roster, optionally narrowed by state and duty status.
pub async fn list_commanders(
    State(state): State<AppState>,
    Query(query): Query<CommanderQuery>,
) -> ApiResult<Vec<Commander>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let wanted_state = query.state.as_deref().and_then(canonical_state);
    if query.state.is_some() && wanted_state.is_none() {
        return success(Vec::new(), revision_id);
    }

    match state.repo.list_commanders().await {
        Ok(commanders) => success(
            commanders
                .into_iter()
                .filter(|c| wanted_state.map_or(true, |s| c.state == s))
                .filter(|c| query.status.map_or(true, |s| c.status == s))
                .collect(),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/commanders/:id
pub async fn get_commander(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Commander> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_commander(&id).await {
        Ok(Some(commander)) => success(commander, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Commander {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/commanders - Register a commander.
pub async fn create_commander(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateCommanderRequest>,
) -> ApiResult<Commander> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }
    if request.name.trim().is_empty() || request.rank.trim().is_empty() {
        return error(
            AppError::Validation("Name and rank are required".to_string()),
            revision_id,
        );
    }
    let state_name = match resolve_state(&request.state) {
        Ok(name) => name,
        Err(e) => return error(e, revision_id),
    };
    if let Err(e) = check_contact(request.phone.as_deref(), request.email.as_deref()) {
        return error(e, revision_id);
    }
    if let Err(e) = check_linked_user(&state, request.user_id.as_deref()).await {
        return error(e, revision_id);
    }

    match state
        .repo
        .create_commander(&request, state_name, current.id())
        .await
    {
        Ok(commander) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .feed
                .publish("commanders", ChangeAction::Insert, &commander.id, new_revision);
            success(commander, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/commanders/:id
pub async fn update_commander(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCommanderRequest>,
) -> ApiResult<Commander> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }
    let state_name = match request.state.as_deref().map(resolve_state).transpose() {
        Ok(name) => name,
        Err(e) => return error(e, revision_id),
    };
    if let Err(e) = check_contact(request.phone.as_deref(), request.email.as_deref()) {
        return error(e, revision_id);
    }
    if let Err(e) = check_linked_user(&state, request.user_id.as_deref()).await {
        return error(e, revision_id);
    }

    match state
        .repo
        .update_commander(&id, &request, state_name, current.id())
        .await
    {
        Ok(commander) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .feed
                .publish("commanders", ChangeAction::Update, &commander.id, new_revision);
            success(commander, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/commanders/:id
pub async fn delete_commander(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }

    match state.repo.delete_commander(&id, current.id()).await {
        Ok(()) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .feed
                .publish("commanders", ChangeAction::Delete, &id, new_revision);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/commanders/:id/dashboard - Admins and analysts see any; commanders their own.
pub async fn get_commander_dashboard(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<CommanderDashboard> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if current.is_commander() {
        match state.repo.find_commander_by_user(current.id()).await {
            Ok(Some(own)) if own.id == id => {}
            Ok(_) => {
                return error(
                    AppError::Forbidden("Commanders may only view their own dashboard".to_string()),
                    revision_id,
                )
            }
            Err(e) => return error(e, revision_id),
        }
    }

    match state.repo.commander_dashboard(&id).await {
        Ok(Some(dashboard)) => success(dashboard, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Commander {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/me/dashboard - Dashboard of the commander linked to the caller.
pub async fn get_my_dashboard(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<CommanderDashboard> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let commander = match state.repo.find_commander_by_user(current.id()).await {
        Ok(Some(commander)) => commander,
        Ok(None) => {
            return error(
                AppError::NotFound("No commander profile is linked to this account".to_string()),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    };

    match state.repo.commander_dashboard(&commander.id).await {
        Ok(Some(dashboard)) => success(dashboard, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Commander {} not found", commander.id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}
