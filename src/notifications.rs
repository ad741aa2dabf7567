//! Notification Store: durable per-user inbox, mirroring transient pub/sub events.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::Notification;

/// Persists and serves the durable per-user notification inbox.
#[derive(Clone)]
pub struct NotificationStore {
    pool: PgPool,
}

impl NotificationStore {
    /// Creates a new notification store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a durable Notification row. Called by any component surfacing an event,
    /// in particular the Event Bus Adapter for every `notifications:*` publish.
    #[tracing::instrument(skip(self, metadata))]
    pub async fn create(
        &self,
        user_id: Uuid,
        notification_type: &str,
        title: &str,
        body: &str,
        metadata: Value,
    ) -> Result<Notification, AppError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, user_id, notification_type, title, body, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, notification_type, title, body, metadata, read, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(notification_type)
        .bind(title)
        .bind(body)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(notification)
    }

    /// Lists a user's inbox, most recent first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, AppError> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, notification_type, title, body, metadata, read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    /// Flips a notification's `read` flag to true. The only mutation the store allows.
    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<Notification, AppError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications SET read = true
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, notification_type, title, body, metadata, read, created_at
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("notification not found".to_string()))?;
        Ok(notification)
    }
}
