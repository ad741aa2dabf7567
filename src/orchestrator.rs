//! Session Orchestrator: the per-session state machine.
//!
//! One logical instance per session, persisted in the relational store; concurrency is
//! mediated by row-level locks rather than an in-process mutex.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::collaborators::{RtcRole, RtcToken};
use crate::error::AppError;
use crate::event_bus::EventBus;
use crate::ledger::Ledger;
use crate::model::{Message, ReaderPresence, Session, SessionStatus, SessionType};
use crate::money;
use crate::presence::PresenceRegistry;
use crate::token_broker::{allocate_channel_name, TokenBroker};

/// A reader's token bundle returned from a successful accept.
#[derive(Debug, Clone)]
pub struct AcceptResult {
    /// The accepted session, post-transition.
    pub session: Session,
    /// The reader's freshly minted RTC token.
    pub rtc_token: RtcToken,
}

/// Coordinates session lifecycle transitions across the Ledger, Presence Registry, Token
/// Broker, and Event Bus Adapter.
#[derive(Clone)]
pub struct SessionOrchestrator {
    pool: PgPool,
    ledger: Ledger,
    presence: PresenceRegistry,
    token_broker: TokenBroker,
    event_bus: EventBus,
    platform_fee: Decimal,
    pending_timeout_minutes: i64,
}

impl SessionOrchestrator {
    /// Creates a new orchestrator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        ledger: Ledger,
        presence: PresenceRegistry,
        token_broker: TokenBroker,
        event_bus: EventBus,
        platform_fee: Decimal,
        pending_timeout_minutes: i64,
    ) -> Self {
        Self {
            pool,
            ledger,
            presence,
            token_broker,
            event_bus,
            platform_fee,
            pending_timeout_minutes,
        }
    }

    /// Looks up a session by id.
    pub async fn get(&self, session_id: Uuid) -> Result<Session, AppError> {
        fetch_session(&self.pool, session_id).await
    }

    /// Requests a new session with `reader_id`. Fails `READER_UNAVAILABLE` unless the
    /// reader is currently `online`, and `INSUFFICIENT_BALANCE` unless the client's
    /// balance covers the 3x-rate reserve.
    #[tracing::instrument(skip(self))]
    pub async fn request(
        &self,
        client_id: Uuid,
        reader_id: Uuid,
        session_type: SessionType,
    ) -> Result<Session, AppError> {
        let reader: crate::model::ReaderProfile = sqlx::query_as(
            r#"
            SELECT user_id, rate_chat, rate_voice, rate_video, presence, pending_balance,
                   total_earned, total_paid_out, rating, review_count, total_readings,
                   external_account_handle, external_account_status
            FROM reader_profiles WHERE user_id = $1
            "#,
        )
        .bind(reader_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("reader not found".to_string()))?;

        if !reader.is_bookable() {
            return Err(AppError::ReaderUnavailable);
        }
        let rate_per_min = reader.rate_for(session_type);

        let (balance,): (Decimal,) =
            sqlx::query_as("SELECT balance FROM client_profiles WHERE user_id = $1")
                .bind(client_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::NotFound("client not found".to_string()))?;

        let reserve = money::reserve_for_rate(rate_per_min);
        if balance < reserve {
            return Err(AppError::InsufficientBalance {
                required: reserve,
                available: balance,
            });
        }

        let session_id = Uuid::new_v4();
        let rtc_channel = allocate_channel_name("reading", session_id);
        let pubsub_channel = allocate_channel_name("pubsub", session_id);

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions
                (id, client_id, reader_id, session_type, status, rate_per_min,
                 rtc_channel, pubsub_channel, metadata)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, '{}'::jsonb)
            RETURNING id, client_id, reader_id, session_type, status, rate_per_min,
                      start_time, end_time, duration_seconds, total_amount, platform_fee,
                      reader_earnings, rtc_channel, pubsub_channel, notes, metadata,
                      created_at, updated_at
            "#,
        )
        .bind(session_id)
        .bind(client_id)
        .bind(reader_id)
        .bind(session_type)
        .bind(rate_per_min)
        .bind(&rtc_channel)
        .bind(&pubsub_channel)
        .fetch_one(&self.pool)
        .await?;

        self.event_bus
            .notify(
                reader_id,
                "reading_request",
                "New reading request",
                "A client has requested a session with you.",
                json!({ "session_id": session_id }),
            )
            .await?;

        Ok(session)
    }

    /// Accepts a pending session on behalf of its reader. Idempotent: accepting an
    /// already-`active` session for the same reader returns the same row and a freshly
    /// minted token rather than erroring.
    #[tracing::instrument(skip(self))]
    pub async fn accept(&self, reader_id: Uuid, session_id: Uuid) -> Result<AcceptResult, AppError> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, client_id, reader_id, session_type, status, rate_per_min,
                   start_time, end_time, duration_seconds, total_amount, platform_fee,
                   reader_earnings, rtc_channel, pubsub_channel, notes, metadata,
                   created_at, updated_at
            FROM sessions WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("session not found".to_string()))?;

        if session.reader_id != reader_id {
            return Err(AppError::NotAuthorized("not this session's reader".to_string()));
        }

        let session = if session.status == SessionStatus::Active {
            session
        } else if session.status == SessionStatus::Pending {
            if let Err(err) = self.presence.reserve_for_session_tx(&mut tx, reader_id).await {
                if matches!(err, AppError::ReaderUnavailable) {
                    sqlx::query(
                        "UPDATE sessions SET status = 'cancelled', notes = 'reader_already_in_session', updated_at = now() WHERE id = $1",
                    )
                    .bind(session_id)
                    .execute(&mut *tx)
                    .await?;
                    tx.commit().await?;
                }
                return Err(err);
            }

            let updated = sqlx::query_as::<_, Session>(
                r#"
                UPDATE sessions SET status = 'active', start_time = now(), updated_at = now()
                WHERE id = $1
                RETURNING id, client_id, reader_id, session_type, status, rate_per_min,
                          start_time, end_time, duration_seconds, total_amount, platform_fee,
                          reader_earnings, rtc_channel, pubsub_channel, notes, metadata,
                          created_at, updated_at
                "#,
            )
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;

            self.presence
                .publish_transition(reader_id, ReaderPresence::InSession)
                .await?;

            let client_token = self
                .token_broker
                .mint_rtc_token(updated.client_id, &updated.rtc_channel, RtcRole::Publisher)
                .await?;
            self.event_bus
                .publish(
                    &EventBus::user_channel(updated.client_id),
                    "session_accepted",
                    &json!({
                        "session_id": updated.id,
                        "rtc_token": client_token.token,
                        "uid": client_token.uid,
                        "channel": updated.rtc_channel,
                    }),
                )
                .await?;
            self.event_bus
                .publish(
                    &EventBus::session_channel(updated.id),
                    "session-started",
                    &json!({ "session_id": updated.id }),
                )
                .await?;

            updated
        } else {
            return Err(AppError::InvalidState(format!(
                "session is {:?}, cannot accept",
                session.status
            )));
        };

        let reader_token = self
            .token_broker
            .mint_rtc_token(reader_id, &session.rtc_channel, RtcRole::Publisher)
            .await?;

        Ok(AcceptResult {
            session,
            rtc_token: reader_token,
        })
    }

    /// Declines a pending session.
    #[tracing::instrument(skip(self))]
    pub async fn decline(
        &self,
        reader_id: Uuid,
        session_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Session, AppError> {
        let mut tx = self.pool.begin().await?;
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, client_id, reader_id, session_type, status, rate_per_min,
                   start_time, end_time, duration_seconds, total_amount, platform_fee,
                   reader_earnings, rtc_channel, pubsub_channel, notes, metadata,
                   created_at, updated_at
            FROM sessions WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("session not found".to_string()))?;

        if session.reader_id != reader_id {
            return Err(AppError::NotAuthorized("not this session's reader".to_string()));
        }
        if session.status != SessionStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "session is {:?}, cannot decline",
                session.status
            )));
        }

        let updated = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions SET status = 'cancelled', notes = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, client_id, reader_id, session_type, status, rate_per_min,
                      start_time, end_time, duration_seconds, total_amount, platform_fee,
                      reader_earnings, rtc_channel, pubsub_channel, notes, metadata,
                      created_at, updated_at
            "#,
        )
        .bind(session_id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        self.event_bus
            .publish(
                &EventBus::user_channel(updated.client_id),
                "session_declined",
                &json!({ "session_id": updated.id, "reason": reason }),
            )
            .await?;

        Ok(updated)
    }

    /// Ends an active session: computes duration/charge, invokes `Ledger::settle_session`,
    /// releases reader presence, and publishes the termination events. Idempotent: ending
    /// an already-terminal session returns the already-computed row without re-settling.
    #[tracing::instrument(skip(self))]
    pub async fn end(&self, subject: Uuid, session_id: Uuid) -> Result<Session, AppError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, client_id, reader_id, session_type, status, rate_per_min,
                   start_time, end_time, duration_seconds, total_amount, platform_fee,
                   reader_earnings, rtc_channel, pubsub_channel, notes, metadata,
                   created_at, updated_at
            FROM sessions WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("session not found".to_string()))?;

        if !existing.is_party(subject) {
            return Err(AppError::NotAuthorized("not a party to this session".to_string()));
        }
        if existing.status.is_terminal() {
            tx.commit().await?;
            return Ok(existing);
        }
        if existing.status != SessionStatus::Active {
            return Err(AppError::InvalidState(
                "session was never accepted".to_string(),
            ));
        }

        let end_time = Utc::now();
        let start_time = existing
            .start_time
            .ok_or_else(|| AppError::InvalidState("active session missing start_time".to_string()))?;
        let duration_seconds = (end_time - start_time).num_seconds().max(1);
        let minutes = money::minutes_billed(duration_seconds);
        let computed = money::compute_charge(minutes, existing.rate_per_min, self.platform_fee);

        // Settles within the same transaction that holds the session row lock, so a second
        // `end` on the same session blocks on the `FOR UPDATE` until this one commits and
        // then observes the already-terminal status instead of settling twice.
        let (split, partial) = self
            .ledger
            .settle_session(&mut tx, session_id, existing.client_id, existing.reader_id, computed)
            .await?;

        let mut metadata = existing.metadata.clone();
        if partial {
            metadata["partial_settlement"] = json!(true);
        }

        let updated = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET status = 'completed', end_time = $2, duration_seconds = $3,
                total_amount = $4, platform_fee = $5, reader_earnings = $6,
                metadata = $7, updated_at = now()
            WHERE id = $1
            RETURNING id, client_id, reader_id, session_type, status, rate_per_min,
                      start_time, end_time, duration_seconds, total_amount, platform_fee,
                      reader_earnings, rtc_channel, pubsub_channel, notes, metadata,
                      created_at, updated_at
            "#,
        )
        .bind(session_id)
        .bind(end_time)
        .bind(duration_seconds as i32)
        .bind(split.total_amount)
        .bind(split.platform_fee)
        .bind(split.reader_earnings)
        .bind(metadata)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        sqlx::query("UPDATE reader_profiles SET total_readings = total_readings + 1 WHERE user_id = $1")
            .bind(updated.reader_id)
            .execute(&self.pool)
            .await?;

        {
            let mut tx = self.pool.begin().await?;
            self.presence
                .release_after_session_tx(&mut tx, updated.reader_id)
                .await?;
            tx.commit().await?;
        }
        self.presence
            .publish_transition(updated.reader_id, ReaderPresence::Online)
            .await?;

        self.event_bus
            .publish(
                &EventBus::session_channel(updated.id),
                "session-ended",
                &json!({
                    "session_id": updated.id,
                    "duration_seconds": updated.duration_seconds,
                    "total_amount": updated.total_amount,
                }),
            )
            .await?;
        self.event_bus
            .notify(
                updated.client_id,
                "session_ended",
                "Reading ended",
                "Your session has ended.",
                json!({ "session_id": updated.id, "total_amount": updated.total_amount }),
            )
            .await?;
        self.event_bus
            .notify(
                updated.reader_id,
                "session_ended",
                "Reading ended",
                "Your session has ended.",
                json!({ "session_id": updated.id, "reader_earnings": updated.reader_earnings }),
            )
            .await?;

        Ok(updated)
    }

    /// Appends a chat message to an active session and publishes it on the session
    /// channel. Fails `INVALID_STATE` outside `active`.
    #[tracing::instrument(skip(self, body))]
    pub async fn send_message(
        &self,
        subject: Uuid,
        session_id: Uuid,
        body: &str,
    ) -> Result<Message, AppError> {
        let session = fetch_session(&self.pool, session_id).await?;
        if !session.is_party(subject) {
            return Err(AppError::NotAuthorized("not a party to this session".to_string()));
        }
        if session.status != SessionStatus::Active {
            return Err(AppError::InvalidState(
                "session is not active".to_string(),
            ));
        }

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, session_id, sender_id, body)
            VALUES ($1, $2, $3, $4)
            RETURNING id, session_id, sender_id, body, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(subject)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;

        self.event_bus
            .publish(
                &EventBus::session_channel(session_id),
                "message",
                &json!({
                    "sender_id": message.sender_id,
                    "body": message.body,
                    "created_at": message.created_at,
                }),
            )
            .await?;

        Ok(message)
    }

    /// Cancels every `pending` session older than the configured timeout. Run on a
    /// `tokio::time::interval`, grounded on the Payout Scheduler's own periodic-task shape
    /// since the distilled spec gives this sweep no component of its own.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_stale_pending(&self) -> Result<u64, AppError> {
        let rows = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET status = 'cancelled', notes = 'timeout', updated_at = now()
            WHERE status = 'pending' AND created_at < now() - ($1 || ' minutes')::interval
            RETURNING id, client_id, reader_id, session_type, status, rate_per_min,
                      start_time, end_time, duration_seconds, total_amount, platform_fee,
                      reader_earnings, rtc_channel, pubsub_channel, notes, metadata,
                      created_at, updated_at
            "#,
        )
        .bind(self.pending_timeout_minutes.to_string())
        .fetch_all(&self.pool)
        .await?;

        for session in &rows {
            self.event_bus
                .notify(
                    session.client_id,
                    "session_timeout",
                    "Reading request expired",
                    "Your reading request was not accepted in time.",
                    json!({ "session_id": session.id }),
                )
                .await?;
        }

        Ok(rows.len() as u64)
    }
}

async fn fetch_session(pool: &PgPool, session_id: Uuid) -> Result<Session, AppError> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT id, client_id, reader_id, session_type, status, rate_per_min,
               start_time, end_time, duration_seconds, total_amount, platform_fee,
               reader_earnings, rtc_channel, pubsub_channel, notes, metadata,
               created_at, updated_at
        FROM sessions WHERE id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("session not found".to_string()))
}
