//! Session-based authentication for the back office.
//!
//! Operators log in with email and password and receive an opaque bearer token.
//! Token comparison for credentials is constant-time to mitigate timing attacks.

mod password;

pub use password::{hash_password, verify_password, PasswordHash};

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::config::BootstrapAdmin;
use crate::db::Repository;
use crate::errors::{codes, AppError, ErrorDetails, ErrorResponse};
use crate::models::{Role, UserProfile};
use crate::validation::{describe_password_failures, validate_email, validate_password};
use crate::AppState;

/// Query string carrying the token where headers cannot be set (WebSocket upgrades).
#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// The authenticated operator, inserted into request extensions by [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: UserProfile,
    pub token: String,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn is_commander(&self) -> bool {
        self.user.role == Role::Commander
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.user.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role {} may not perform this action",
                self.user.role.as_str()
            )))
        }
    }
}

/// Session middleware: resolves the bearer token, then records the request in the access log.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request).or_else(|| query_token(&request)) else {
        return unauthorized_response("Missing session token");
    };

    let user = match state.repo.find_session_user(&token).await {
        Ok(Some(user)) => user,
        Ok(None) => return unauthorized_response("Session expired or invalid"),
        Err(e) => return e.into_response(),
    };

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let user_id = user.id.clone();

    request.extensions_mut().insert(CurrentUser { user, token });
    let response = next.run(request).await;

    if let Err(e) = state
        .repo
        .record_access(Some(&user_id), &method, &path, response.status().as_u16())
        .await
    {
        tracing::warn!("Failed to record access log: {}", e);
    }

    response
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn query_token(request: &Request) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.access_token)
        .filter(|token| !token.is_empty())
}

/// Seed the first administrator when no accounts exist yet.
pub async fn bootstrap_admin(
    repo: &Repository,
    admin: Option<&BootstrapAdmin>,
) -> Result<Option<UserProfile>, AppError> {
    if repo.count_users().await? > 0 {
        return Ok(None);
    }

    let Some(admin) = admin else {
        tracing::warn!(
            "No operator accounts exist and DHQ_ADMIN_EMAIL/DHQ_ADMIN_PASSWORD are unset; nobody can sign in"
        );
        return Ok(None);
    };

    if !validate_email(&admin.email) {
        return Err(AppError::Validation(format!(
            "Bootstrap admin email {} is invalid",
            admin.email
        )));
    }
    validate_password(&admin.password)
        .map_err(|failed| AppError::Validation(describe_password_failures(&failed)))?;

    let user = repo
        .create_user(
            &admin.email,
            "Administrator",
            Role::Admin,
            &hash_password(&admin.password),
            None,
        )
        .await?;

    tracing::info!(email = %user.email, "Bootstrap administrator created");
    Ok(Some(user))
}

/// Perform constant-time string comparison.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Create an unauthorized response.
fn unauthorized_response(message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorDetails {
            code: codes::UNAUTHORIZED.to_string(),
            message: message.to_string(),
            details: None,
        },
        revision_id: 0,
    };

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
