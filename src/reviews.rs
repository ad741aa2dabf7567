//! Review Aggregator: client reviews of completed sessions and the reader's running
//! rating.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::event_bus::EventBus;
use crate::model::{Review, SessionStatus};

/// Owns review creation, reader responses, and the rating rollup on `reader_profiles`.
#[derive(Clone)]
pub struct ReviewAggregator {
    pool: PgPool,
    event_bus: EventBus,
}

impl ReviewAggregator {
    /// Creates a new review aggregator.
    pub fn new(pool: PgPool, event_bus: EventBus) -> Self {
        Self { pool, event_bus }
    }

    /// Records a client's review of a completed session they own, then recomputes the
    /// reader's `rating` and `review_count` from every review on file.
    #[tracing::instrument(skip(self, comment))]
    pub async fn submit_review(
        &self,
        client_id: Uuid,
        session_id: Uuid,
        rating: i16,
        comment: Option<&str>,
    ) -> Result<Review, AppError> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation("rating must be between 1 and 5".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let (session_client_id, reader_id, status): (Uuid, Uuid, SessionStatus) = sqlx::query_as(
            "SELECT client_id, reader_id, status FROM sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("session not found".to_string()))?;

        if session_client_id != client_id {
            return Err(AppError::NotAuthorized("not this session's client".to_string()));
        }
        if status != SessionStatus::Completed {
            return Err(AppError::InvalidState(
                "session is not completed".to_string(),
            ));
        }

        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM reviews WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("session already reviewed".to_string()));
        }

        let review = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (id, session_id, reader_id, client_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, session_id, reader_id, client_id, rating, comment, reader_response,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(reader_id)
        .bind(client_id)
        .bind(rating)
        .bind(comment)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE reader_profiles
            SET rating = COALESCE((SELECT AVG(rating) FROM reviews WHERE reader_id = $1), 0),
                review_count = (SELECT COUNT(*) FROM reviews WHERE reader_id = $1)
            WHERE user_id = $1
            "#,
        )
        .bind(reader_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.event_bus
            .notify(
                reader_id,
                "new_review",
                "New review",
                "A client left you a review.",
                serde_json::json!({ "session_id": session_id, "rating": rating }),
            )
            .await?;

        Ok(review)
    }

    /// Records a reader's response to a review they own. Fails if a response is already
    /// recorded.
    #[tracing::instrument(skip(self, response))]
    pub async fn respond_to_review(
        &self,
        reader_id: Uuid,
        review_id: Uuid,
        response: &str,
    ) -> Result<Review, AppError> {
        let existing = sqlx::query_as::<_, Review>(
            r#"
            SELECT id, session_id, reader_id, client_id, rating, comment, reader_response,
                   created_at, updated_at
            FROM reviews WHERE id = $1
            "#,
        )
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("review not found".to_string()))?;

        if existing.reader_id != reader_id {
            return Err(AppError::NotAuthorized("not this review's reader".to_string()));
        }
        if existing.reader_response.is_some() {
            return Err(AppError::InvalidState("response already recorded".to_string()));
        }

        let updated = sqlx::query_as::<_, Review>(
            r#"
            UPDATE reviews SET reader_response = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, session_id, reader_id, client_id, rating, comment, reader_response,
                      created_at, updated_at
            "#,
        )
        .bind(review_id)
        .bind(response)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }
}
