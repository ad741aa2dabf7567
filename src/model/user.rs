//! User, ClientProfile, and ReaderProfile entities.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's role. Immutable except by an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    /// Consumes sessions; holds a prepaid balance.
    Client,
    /// Provides sessions; earns a share of the per-minute charge.
    Reader,
    /// Operates the platform; may issue refunds and adjust roles.
    Admin,
}

/// Stable identifier, external identity subject, role, creation time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Stable internal identifier.
    pub id: Uuid,
    /// Opaque subject id supplied by the identity collaborator.
    pub external_subject: String,
    /// Role, set at creation and changed only by an admin.
    pub role: UserRole,
    /// When this user row was first synced from the identity collaborator.
    pub created_at: DateTime<Utc>,
}

/// A reader's coarse availability, exposed to clients for listing and eligibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reader_presence", rename_all = "snake_case")]
pub enum ReaderPresence {
    /// Not signed in / not taking requests.
    Offline,
    /// Signed in and eligible to receive session requests.
    Online,
    /// Signed in but temporarily not taking requests.
    Busy,
    /// Currently holding exactly one active session.
    InSession,
}

/// Status of a reader's external payout account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_status", rename_all = "lowercase")]
pub enum AccountStatus {
    /// Registered with the payment processor but not yet verified.
    Pending,
    /// Eligible to receive payouts.
    Active,
    /// Payouts are blocked (compliance hold, failed verification, etc).
    Restricted,
}

/// One-to-one with a client user. Holds the prepaid balance Ledger mutates.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClientProfile {
    /// The owning user's id.
    pub user_id: Uuid,
    /// Non-negative prepaid balance.
    pub balance: Decimal,
    /// Cumulative amount spent across all settled sessions.
    pub total_spent: Decimal,
    /// Whether auto-reload is configured. The core persists this but never triggers a
    /// top-up itself; that's the storefront's job.
    pub auto_reload_enabled: bool,
    /// Balance threshold below which a top-up would be triggered by the storefront.
    pub auto_reload_threshold: Option<Decimal>,
    /// Amount the storefront would top up by.
    pub auto_reload_amount: Option<Decimal>,
}

/// One-to-one with a reader user. Holds per-minute rates, presence, and earnings.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReaderProfile {
    /// The owning user's id.
    pub user_id: Uuid,
    /// Per-minute rate for chat sessions.
    pub rate_chat: Decimal,
    /// Per-minute rate for voice sessions.
    pub rate_voice: Decimal,
    /// Per-minute rate for video sessions.
    pub rate_video: Decimal,
    /// Current coarse availability.
    pub presence: ReaderPresence,
    /// Earned but not yet paid out.
    pub pending_balance: Decimal,
    /// Cumulative earnings across all settled sessions.
    pub total_earned: Decimal,
    /// Cumulative amount paid out via the payout scheduler or a manual payout.
    pub total_paid_out: Decimal,
    /// Running average rating across all reviews.
    pub rating: Decimal,
    /// Number of reviews contributing to `rating`.
    pub review_count: i32,
    /// Number of completed sessions.
    pub total_readings: i32,
    /// Handle for the reader's account with the external payment processor.
    pub external_account_handle: Option<String>,
    /// Status of that external account.
    pub external_account_status: AccountStatus,
}

impl ReaderProfile {
    /// The frozen per-minute rate for a given session type.
    pub fn rate_for(&self, session_type: super::SessionType) -> Decimal {
        match session_type {
            super::SessionType::Chat => self.rate_chat,
            super::SessionType::Voice => self.rate_voice,
            super::SessionType::Video => self.rate_video,
        }
    }

    /// Whether this reader may currently accept a new session request.
    pub fn is_bookable(&self) -> bool {
        self.presence == ReaderPresence::Online
    }
}
