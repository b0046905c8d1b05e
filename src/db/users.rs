//! Operator accounts and sessions.

use chrono::{Duration, SecondsFormat, Utc};
use serde_json::json;
use sqlx::Row;

use super::repository::{bump_revision, insert_audit, new_id, now_timestamp, Repository};
use crate::auth::PasswordHash;
use crate::errors::AppError;
use crate::models::{Role, UpdateUserRequest, UserProfile};

const USER_COLUMNS: &str = "id, email, full_name, role, active, created_at, last_login_at";

/// A stored account together with its credential material.
pub struct UserCredentials {
    pub user: UserProfile,
    pub password: PasswordHash,
}

impl Repository {
    pub async fn count_users(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY full_name",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    /// Look up an account by email (case-insensitive) with its password hash.
    pub async fn find_user_credentials(&self, email: &str) -> Result<Option<UserCredentials>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {}, password_hash, password_salt FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(|row| UserCredentials {
            user: user_from_row(row),
            password: PasswordHash {
                salt: row.get("password_salt"),
                hash: row.get("password_hash"),
            },
        }))
    }

    pub async fn get_user_credentials(&self, id: &str) -> Result<Option<UserCredentials>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {}, password_hash, password_salt FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(|row| UserCredentials {
            user: user_from_row(row),
            password: PasswordHash {
                salt: row.get("password_salt"),
                hash: row.get("password_hash"),
            },
        }))
    }

    /// Create an operator account. `actor_id` is `None` for the bootstrap admin.
    pub async fn create_user(
        &self,
        email: &str,
        full_name: &str,
        role: Role,
        password: &PasswordHash,
        actor_id: Option<&str>,
    ) -> Result<UserProfile, AppError> {
        let email = email.trim().to_lowercase();
        let exists = sqlx::query("SELECT 1 FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_some() {
            return Err(AppError::Validation(format!(
                "An account for {} already exists",
                email
            )));
        }

        let user = UserProfile {
            id: new_id(),
            email,
            full_name: full_name.trim().to_string(),
            role,
            active: true,
            created_at: now_timestamp(),
            last_login_at: None,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO users (id, email, full_name, role, password_hash, password_salt, active, created_at)
               VALUES (?, ?, ?, ?, ?, ?, 1, ?)"#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(&password.hash)
        .bind(&password.salt)
        .bind(&user.created_at)
        .execute(&mut *tx)
        .await?;

        insert_audit(
            &mut tx,
            actor_id,
            "create",
            "user",
            &user.id,
            json!({ "email": user.email, "role": user.role }),
        )
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Update profile, role or active flag. Deactivation ends every session.
    pub async fn update_user(
        &self,
        id: &str,
        request: &UpdateUserRequest,
        actor_id: &str,
    ) -> Result<UserProfile, AppError> {
        let existing = self
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        let updated = UserProfile {
            full_name: request
                .full_name
                .as_ref()
                .map(|n| n.trim().to_string())
                .unwrap_or(existing.full_name.clone()),
            role: request.role.unwrap_or(existing.role),
            active: request.active.unwrap_or(existing.active),
            ..existing.clone()
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET full_name = ?, role = ?, active = ? WHERE id = ?")
            .bind(&updated.full_name)
            .bind(updated.role.as_str())
            .bind(updated.active as i32)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if !updated.active {
            sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        insert_audit(
            &mut tx,
            Some(actor_id),
            "update",
            "user",
            id,
            json!({
                "role": { "from": existing.role, "to": updated.role },
                "active": { "from": existing.active, "to": updated.active },
            }),
        )
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Replace a password and drop every other session of that user.
    pub async fn set_password(
        &self,
        user_id: &str,
        password: &PasswordHash,
        keep_session: Option<&str>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET password_hash = ?, password_salt = ? WHERE id = ?")
            .bind(&password.hash)
            .bind(&password.salt)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = ? AND token IS NOT ?")
            .bind(user_id)
            .bind(keep_session)
            .execute(&mut *tx)
            .await?;

        insert_audit(
            &mut tx,
            Some(user_id),
            "password_change",
            "user",
            user_id,
            json!({}),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Open a session and return `(token, expires_at)`.
    pub async fn create_session(&self, user_id: &str, ttl_hours: i64) -> Result<(String, String), AppError> {
        let token = new_id();
        let now = Utc::now();
        let expires_at =
            (now + Duration::hours(ttl_hours)).to_rfc3339_opts(SecondsFormat::Micros, true);

        sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(now.to_rfc3339_opts(SecondsFormat::Micros, true))
            .bind(&expires_at)
            .execute(&self.pool)
            .await?;

        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(now.to_rfc3339_opts(SecondsFormat::Micros, true))
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok((token, expires_at))
    }

    /// Resolve a bearer token to its active, unexpired account.
    pub async fn find_session_user(&self, token: &str) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query(
            r#"SELECT u.id, u.email, u.full_name, u.role, u.active, u.created_at, u.last_login_at
               FROM sessions s JOIN users u ON u.id = s.user_id
               WHERE s.token = ? AND s.expires_at > ? AND u.active = 1"#,
        )
        .bind(token)
        .bind(now_timestamp())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove expired sessions and return how many were dropped.
    pub async fn purge_expired_sessions(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> UserProfile {
    let role: String = row.get("role");
    let active: i32 = row.get("active");
    UserProfile {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        role: Role::parse(&role).unwrap_or(Role::Analyst),
        active: active != 0,
        created_at: row.get("created_at"),
        last_login_at: row.get("last_login_at"),
    }
}
