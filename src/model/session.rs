//! Session and Message entities.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session modality, each with its own frozen per-minute rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_type", rename_all = "lowercase")]
pub enum SessionType {
    /// Text chat.
    Chat,
    /// Voice call.
    Voice,
    /// Video call.
    Video,
}

/// Session lifecycle state. Transitions follow the FSM in the orchestrator; `Completed`,
/// `Cancelled`, and `Disputed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_status", rename_all = "lowercase")]
pub enum SessionStatus {
    /// Requested, waiting on the reader to accept or decline.
    Pending,
    /// Accepted; billing clock (wall-clock, measured at end) is running.
    Active,
    /// Ended and settled.
    Completed,
    /// Declined, timed out, or lost an accept race while pending.
    Cancelled,
    /// Completed with a partial settlement or otherwise flagged for manual review.
    Disputed,
}

impl SessionStatus {
    /// Whether this status may never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Disputed
        )
    }
}

/// One consultation between a client and a reader, priced per whole started minute.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    /// Session identifier.
    pub id: Uuid,
    /// The requesting client.
    pub client_id: Uuid,
    /// The reader the session is booked with.
    pub reader_id: Uuid,
    /// Modality, fixed at request time.
    #[sqlx(rename = "session_type")]
    pub session_type: SessionType,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Per-minute rate frozen from the reader's rate card at request time.
    pub rate_per_min: Decimal,
    /// Set on accept.
    pub start_time: Option<DateTime<Utc>>,
    /// Set on end.
    pub end_time: Option<DateTime<Utc>>,
    /// Computed at end: `ceil(end - start)` in seconds, minimum 1.
    pub duration_seconds: Option<i32>,
    /// Computed at end: `ceil(duration_seconds / 60) * rate_per_min`, possibly scaled down
    /// by a partial settlement.
    pub total_amount: Option<Decimal>,
    /// The platform's retained share of `total_amount`.
    pub platform_fee: Option<Decimal>,
    /// The reader's share of `total_amount`.
    pub reader_earnings: Option<Decimal>,
    /// Opaque RTC channel name, allocated at request time, never reused.
    pub rtc_channel: String,
    /// Opaque pub/sub channel name, allocated at request time, never reused.
    pub pubsub_channel: String,
    /// Free text: decline reasons, sweep reasons.
    pub notes: Option<String>,
    /// JSON bag holding derived flags such as `partial_settlement`.
    pub metadata: serde_json::Value,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Whether `metadata.partial_settlement` is set.
    pub fn is_partial_settlement(&self) -> bool {
        self.metadata
            .get("partial_settlement")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Whether `user_id` is a party to this session (client or reader).
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.reader_id == user_id
    }
}

/// A chat line within an active session. Owned exclusively by its Session.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    /// Message identifier.
    pub id: Uuid,
    /// The session this message belongs to.
    pub session_id: Uuid,
    /// Which party sent it.
    pub sender_id: Uuid,
    /// Message text.
    pub body: String,
    /// When the message was appended.
    pub created_at: DateTime<Utc>,
}
