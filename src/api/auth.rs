//! Login, session and operator account endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{error, success, ApiResult};
use crate::auth::{hash_password, verify_password, CurrentUser, PasswordHash};
use crate::errors::AppError;
use crate::models::{
    ChangePasswordRequest, CreateUserRequest, LoginRequest, LoginResponse, Role,
    UpdateUserRequest, UserProfile,
};
use crate::realtime::ChangeAction;
use crate::validation::{describe_password_failures, validate_email, validate_password};
use crate::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Hashing is deliberately slow; keep it off the async workers.
async fn hash_blocking(password: String) -> Result<PasswordHash, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

async fn verify_blocking(password: String, stored: PasswordHash) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::Internal(format!("Password check failed: {}", e)))
}

fn check_password_policy(password: &str) -> Result<(), AppError> {
    validate_password(password)
        .map_err(|failed| AppError::Validation(describe_password_failures(&failed)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let credentials = match state.repo.find_user_credentials(&request.email).await {
        Ok(Some(credentials)) if credentials.user.active => credentials,
        Ok(_) => {
            tracing::info!(email = %request.email, "Login rejected");
            return error(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()), revision_id);
        }
        Err(e) => return error(e, revision_id),
    };

    match verify_blocking(request.password, credentials.password).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!(email = %request.email, "Login rejected");
            return error(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()), revision_id);
        }
        Err(e) => return error(e, revision_id),
    }

    let user = credentials.user;
    match state
        .repo
        .create_session(&user.id, state.config.session_ttl_hours)
        .await
    {
        Ok((token, expires_at)) => {
            tracing::info!(user_id = %user.id, role = user.role.as_str(), "Operator signed in");
            success(
                LoginResponse {
                    token,
                    expires_at,
                    user,
                },
                revision_id,
            )
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/auth/logout - End the current session.
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_session(&current.token).await {
        Ok(()) => success((), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<UserProfile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    success(current.user, revision_id)
}

/// POST /api/auth/password - Change the caller's own password.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let stored = match state.repo.get_user_credentials(current.id()).await {
        Ok(Some(credentials)) => credentials.password,
        Ok(None) => {
            return error(
                AppError::NotFound(format!("User {} not found", current.id())),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    };

    match verify_blocking(request.current_password, stored).await {
        Ok(true) => {}
        Ok(false) => {
            return error(
                AppError::Validation("Current password is incorrect".to_string()),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    }

    if let Err(e) = check_password_policy(&request.new_password) {
        return error(e, revision_id);
    }

    let hashed = match hash_blocking(request.new_password).await {
        Ok(hashed) => hashed,
        Err(e) => return error(e, revision_id),
    };

    match state
        .repo
        .set_password(current.id(), &hashed, Some(&current.token))
        .await
    {
        Ok(()) => success((), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Vec<UserProfile>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }

    match state.repo.list_users().await {
        Ok(users) => success(users, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/users - Create an operator account.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<UserProfile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }
    if !validate_email(&request.email) {
        return error(
            AppError::Validation(format!("Invalid email {}", request.email)),
            revision_id,
        );
    }
    if request.full_name.trim().is_empty() {
        return error(
            AppError::Validation("Full name is required".to_string()),
            revision_id,
        );
    }
    if let Err(e) = check_password_policy(&request.password) {
        return error(e, revision_id);
    }

    let hashed = match hash_blocking(request.password).await {
        Ok(hashed) => hashed,
        Err(e) => return error(e, revision_id),
    };

    match state
        .repo
        .create_user(
            &request.email,
            &request.full_name,
            request.role,
            &hashed,
            Some(current.id()),
        )
        .await
    {
        Ok(user) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .feed
                .publish("users", ChangeAction::Insert, &user.id, new_revision);
            success(user, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/users/:id - Change name, role or active flag.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<UserProfile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = current.require_role(&[Role::Admin]) {
        return error(e, revision_id);
    }
    let demotes_self = request.role.is_some_and(|r| r != Role::Admin);
    if id == current.id() && (request.active == Some(false) || demotes_self) {
        return error(
            AppError::Validation("Administrators cannot deactivate or demote themselves".to_string()),
            revision_id,
        );
    }

    match state.repo.update_user(&id, &request, current.id()).await {
        Ok(user) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state
                .feed
                .publish("users", ChangeAction::Update, &user.id, new_revision);
            success(user, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
