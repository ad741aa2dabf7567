//! Transaction entity: the append-only monetary journal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of monetary movement a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
pub enum TransactionType {
    /// Client top-up.
    Deposit,
    /// Client debit for a settled session.
    ReadingPayment,
    /// Reader credit for a settled session.
    ReadingEarning,
    /// Reader payout to the external processor.
    Payout,
    /// Refund of a prior transaction.
    Refund,
    /// Peer-to-peer gift (storefront-owned; recorded here for journal completeness).
    Gift,
    /// Storefront purchase (out of core scope; recorded here for journal completeness).
    ShopPurchase,
}

/// Lifecycle of a transaction row. Only `status` may ever change after insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded but not yet confirmed (e.g. awaiting a payment-intent webhook).
    Pending,
    /// Settled.
    Completed,
    /// The underlying external operation failed.
    Failed,
    /// A corresponding refund transaction exists.
    Refunded,
}

/// Append-only journal row. Content is immutable once written; only `status` may change.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    /// Transaction identifier.
    pub id: Uuid,
    /// The user this transaction's `net_amount` applies to.
    pub user_id: Uuid,
    /// The session this transaction is linked to, if any.
    pub session_id: Option<Uuid>,
    /// What kind of movement this is.
    #[sqlx(rename = "transaction_type")]
    pub transaction_type: TransactionType,
    /// Gross amount.
    pub amount: Decimal,
    /// Fee withheld, if any.
    pub fee: Decimal,
    /// `amount - fee`.
    pub net_amount: Decimal,
    /// Current status.
    pub status: TransactionStatus,
    /// Reference from the external payment processor, used for idempotency.
    pub external_ref: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}
