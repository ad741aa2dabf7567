//! Notification entity: durable per-user inbox, mirroring transient pub/sub events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durable record of an event surfaced to a user. Never deleted by the core; mutated
/// only to flip `read`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    /// Notification identifier.
    pub id: Uuid,
    /// The recipient.
    pub user_id: Uuid,
    /// Type tag, matching the pub/sub event name (e.g. `reading_request`, `new_review`).
    pub notification_type: String,
    /// Short title.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Opaque structured payload (session id, amounts, etc).
    pub metadata: serde_json::Value,
    /// Whether the recipient has read it.
    pub read: bool,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}
