//! Event Bus Adapter: publishes session lifecycle, notifications, and presence updates
//! to the external pub/sub collaborator.
//!
//! Publishing is at-least-once; transient publish failures are retried with exponential
//! backoff (250 ms, doubling, 5 attempts). Ordering across channels is not guaranteed;
//! within a channel it is whatever the collaborator provides.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::collaborators::PubSubService;
use crate::error::AppError;
use crate::notifications::NotificationStore;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_ATTEMPTS: u32 = 5;

/// Publishes lifecycle and notification events, and durably mirrors every per-user
/// notification publish into the Notification Store so late-joining subscribers can
/// rehydrate their inbox over REST.
#[derive(Clone)]
pub struct EventBus {
    pubsub: Arc<dyn PubSubService>,
    notifications: NotificationStore,
}

impl EventBus {
    /// Creates a new event bus adapter.
    pub fn new(pubsub: Arc<dyn PubSubService>, notifications: NotificationStore) -> Self {
        Self {
            pubsub,
            notifications,
        }
    }

    /// Channel name for a session's lifecycle events.
    pub fn session_channel(session_id: Uuid) -> String {
        format!("reading:{session_id}")
    }

    /// Channel name for a user's notification inbox.
    pub fn user_channel(user_id: Uuid) -> String {
        format!("notifications:{user_id}")
    }

    /// The reader-presence channel, shared across all readers.
    pub fn presence_channel() -> &'static str {
        "readers:status"
    }

    /// Publishes `event` on `channel`, retrying transient failures with exponential
    /// backoff. At-least-once: a publish that exhausts its retries surfaces
    /// `TRANSIENT_ERROR` to the caller, who may safely retry the whole operation if it is
    /// idempotent.
    #[tracing::instrument(skip(self, payload))]
    pub async fn publish<T: Serialize + std::fmt::Debug>(
        &self,
        channel: &str,
        event_name: &str,
        payload: &T,
    ) -> Result<(), AppError> {
        let event = serde_json::json!({ "event": event_name, "data": payload });
        let mut delay = INITIAL_BACKOFF;
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.pubsub.publish(channel, event.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(attempt, channel, %err, "pub/sub publish failed, retrying");
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        Err(last_err.unwrap_or(AppError::Transient("publish failed".to_string())))
    }

    /// Publishes a type-tagged notification to a user's inbox channel and durably mirrors
    /// it into the Notification Store.
    #[tracing::instrument(skip(self, metadata))]
    pub async fn notify(
        &self,
        user_id: Uuid,
        notification_type: &str,
        title: &str,
        body: &str,
        metadata: Value,
    ) -> Result<(), AppError> {
        self.notifications
            .create(user_id, notification_type, title, body, metadata.clone())
            .await?;
        self.publish(
            &Self::user_channel(user_id),
            "notification",
            &serde_json::json!({
                "type": notification_type,
                "title": title,
                "body": body,
                "metadata": metadata,
            }),
        )
        .await
    }
}
