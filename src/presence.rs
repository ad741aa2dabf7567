//! Presence Registry: reader availability state machine and its fan-out.
//!
//! Session status is the durable fact; presence is the fast index answering "can I take a
//! request now?". The two are deliberately kept as separate columns — collapsing them
//! would recreate the accept-time race the orchestrator depends on this split to avoid.
//!
//! The transactional methods (`reserve_for_session_tx`, `release_after_session_tx`) take
//! an open `sqlx` transaction so the orchestrator can lock and flip presence as part of
//! the same atomic step that transitions the session row — that shared lock is what makes
//! a concurrent accept race resolve to exactly one winner.

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AppError;
use crate::event_bus::EventBus;
use crate::model::ReaderPresence;

/// Owns reader presence transitions: validates them against the allowed edges, persists
/// the new state, and publishes it on `readers:status`.
#[derive(Clone)]
pub struct PresenceRegistry {
    pool: PgPool,
    event_bus: EventBus,
}

impl PresenceRegistry {
    /// Creates a new presence registry.
    pub fn new(pool: PgPool, event_bus: EventBus) -> Self {
        Self { pool, event_bus }
    }

    /// Whether `from -> to` is an allowed self-service transition (reader-initiated).
    fn self_transition_allowed(from: ReaderPresence, to: ReaderPresence) -> bool {
        use ReaderPresence::*;
        matches!(
            (from, to),
            (Offline, Online) | (Online, Offline) | (Online, Busy) | (Busy, Online)
        )
    }

    /// Reader-initiated presence change (e.g. `PATCH /readers/me/status`). Rejects any
    /// attempt to leave `in_session` by self-action while a session row is still active.
    #[tracing::instrument(skip(self))]
    pub async fn set(&self, reader_id: Uuid, to: ReaderPresence) -> Result<(), AppError> {
        let current = self.current(reader_id).await?;
        if !Self::self_transition_allowed(current, to) {
            return Err(AppError::Validation(format!(
                "cannot transition presence from {current:?} to {to:?}"
            )));
        }
        sqlx::query("UPDATE reader_profiles SET presence = $1, updated_at = now() WHERE user_id = $2")
            .bind(to)
            .bind(reader_id)
            .execute(&self.pool)
            .await?;
        self.publish_transition(reader_id, to).await
    }

    /// Current presence for a reader.
    pub async fn current(&self, reader_id: Uuid) -> Result<ReaderPresence, AppError> {
        let row: (ReaderPresence,) =
            sqlx::query_as("SELECT presence FROM reader_profiles WHERE user_id = $1")
                .bind(reader_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::NotFound("reader not found".to_string()))?;
        Ok(row.0)
    }

    /// Lists readers currently `online`, for `GET /readers/online`.
    pub async fn list_online(&self) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM reader_profiles WHERE presence = 'online'::reader_presence",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Locks the reader's profile row within `tx` and, only if its presence is currently
    /// `online`, flips it to `in_session`. Returns `READER_UNAVAILABLE` otherwise — this is
    /// the check that resolves a concurrent-accept race to exactly one winner, because the
    /// row lock serialises the two accepts and the loser observes the already-flipped row.
    pub async fn reserve_for_session_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reader_id: Uuid,
    ) -> Result<(), AppError> {
        let current: (ReaderPresence,) =
            sqlx::query_as("SELECT presence FROM reader_profiles WHERE user_id = $1 FOR UPDATE")
                .bind(reader_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| AppError::NotFound("reader not found".to_string()))?;
        if current.0 != ReaderPresence::Online {
            return Err(AppError::ReaderUnavailable);
        }
        sqlx::query("UPDATE reader_profiles SET presence = 'in_session'::reader_presence, updated_at = now() WHERE user_id = $1")
            .bind(reader_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Releases a reader back to `online` within `tx`, on session end.
    pub async fn release_after_session_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reader_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE reader_profiles SET presence = 'online'::reader_presence, updated_at = now() WHERE user_id = $1")
            .bind(reader_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Publishes a presence transition that already happened (used after the owning
    /// transaction commits, since pub/sub publishes must never happen inside a DB
    /// transaction that might still roll back).
    pub async fn publish_transition(&self, reader_id: Uuid, to: ReaderPresence) -> Result<(), AppError> {
        self.event_bus
            .publish(
                EventBus::presence_channel(),
                "status-update",
                &serde_json::json!({
                    "reader_id": reader_id,
                    "status": to,
                    "timestamp": Utc::now(),
                }),
            )
            .await
    }
}
