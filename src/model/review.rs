//! Review entity: post-session client rating of a reader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One review per completed session, authored by the client. The reader may only edit
/// `reader_response`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    /// Review identifier.
    pub id: Uuid,
    /// The reviewed session. At most one review per session.
    pub session_id: Uuid,
    /// The reviewed reader.
    pub reader_id: Uuid,
    /// The reviewing client.
    pub client_id: Uuid,
    /// Rating in `[1, 5]`.
    pub rating: i16,
    /// Optional free-text comment.
    pub comment: Option<String>,
    /// Optional reader response, settable once.
    pub reader_response: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time (bumped when `reader_response` is set).
    pub updated_at: DateTime<Utc>,
}
