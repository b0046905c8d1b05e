//! Notification queries.

use sqlx::Row;

use super::repository::Repository;
use crate::errors::AppError;
use crate::models::Notification;

impl Repository {
    /// Most recent notifications for a user, unread first.
    pub async fn list_notifications(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, title, message, entity_type, entity_id, read, created_at
               FROM notifications WHERE user_id = ?
               ORDER BY read ASC, created_at DESC LIMIT ?"#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let read: i32 = row.get("read");
                Notification {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    title: row.get("title"),
                    message: row.get("message"),
                    entity_type: row.get("entity_type"),
                    entity_id: row.get("entity_id"),
                    read: read != 0,
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    /// Mark one of the user's notifications as read.
    pub async fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }
        Ok(())
    }

    /// Mark everything read for a user and return how many rows changed.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
