//! Payout entity: one row per payout attempt, scheduled or manual.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a payout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_status", rename_all = "lowercase")]
pub enum PayoutStatus {
    /// Created, external transfer in flight.
    Processing,
    /// Transfer succeeded and the ledger has been updated.
    Completed,
    /// Transfer failed; the reader's pending balance is untouched.
    Failed,
}

/// One attempt to pay a reader's pending balance out to the external processor, whether
/// triggered by the daily scheduler or a manual request.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payout {
    /// Payout identifier.
    pub id: Uuid,
    /// The reader being paid.
    pub reader_id: Uuid,
    /// Amount transferred.
    pub amount: Decimal,
    /// Current status.
    pub status: PayoutStatus,
    /// Reference returned by the external processor on success.
    pub external_transfer_ref: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// When the attempt reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}
