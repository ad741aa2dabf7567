//! External collaborator interfaces: identity, payments, RTC, pub/sub.
//!
//! The core never calls a concrete HTTP client directly; every external system is
//! reached through one of these narrow `async_trait`s, so the orchestrator and ledger can
//! be exercised against the in-memory `stub` implementations in tests.

pub mod http;
pub mod stub;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;

/// A freshly-synced user record, as returned by the identity collaborator.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Opaque subject id from the identity provider.
    pub external_subject: String,
}

/// Verifies and syncs users from the identity collaborator. Out of scope to implement;
/// the core only consumes this narrow interface.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Confirms `subject` is a known identity and returns its record.
    async fn sync_user(&self, subject: &str) -> Result<UserRecord, AppError>;
}

/// A payment-intent's client secret, handed back to the frontend to complete a top-up.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// Opaque id of the created payment intent.
    pub id: String,
    /// Secret the frontend uses to confirm the payment client-side.
    pub client_secret: String,
}

/// Result of an external transfer (reader payout).
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// Reference assigned by the external processor.
    pub external_transfer_ref: String,
}

/// Payment-intent processor: top-ups and reader transfers.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates a payment intent for a client top-up of `amount`.
    async fn create_intent(&self, amount: rust_decimal::Decimal) -> Result<PaymentIntent, AppError>;

    /// Transfers `amount` to a reader's external account.
    async fn transfer(
        &self,
        amount: rust_decimal::Decimal,
        account_handle: &str,
    ) -> Result<TransferResult, AppError>;

    /// Verifies an inbound webhook's signature and returns its decoded payload.
    fn verify_webhook(&self, body: &[u8], signature: &str) -> Result<Value, AppError>;
}

/// A short-lived token bound to a realtime media channel.
#[derive(Debug, Clone)]
pub struct RtcToken {
    /// Opaque token string.
    pub token: String,
    /// Deterministic numeric UID the subject is bound to within this channel.
    pub uid: u32,
    /// Channel this token grants access to.
    pub channel: String,
    /// Seconds until expiry.
    pub expires_in_seconds: u64,
}

/// Role a subject is granted on an RTC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcRole {
    /// Can publish and subscribe.
    Publisher,
    /// Can only subscribe.
    Subscriber,
}

/// Mints tokenized access to realtime media channels. Out of scope to implement; the core
/// only mints tokens, it never proxies media.
#[async_trait]
pub trait RtcService: Send + Sync {
    /// Mints a token for `subject` on `channel` with the given `role`.
    async fn mint_token(&self, channel: &str, uid: u32, role: RtcRole) -> Result<RtcToken, AppError>;
}

/// A short-lived token bound to the pub/sub bus, granting subscribe/publish/presence.
#[derive(Debug, Clone)]
pub struct PubSubToken {
    /// Opaque token string.
    pub token: String,
    /// Seconds until expiry.
    pub expires_in_seconds: u64,
}

/// Publishes events and mints pub/sub access tokens. Out of scope to implement; the core
/// only mints tokens and publishes, it never proxies subscriber connections.
#[async_trait]
pub trait PubSubService: Send + Sync {
    /// Publishes `event` (already JSON-serialized) on `channel`.
    async fn publish(&self, channel: &str, event: Value) -> Result<(), AppError>;

    /// Mints a pub/sub token for `subject`.
    async fn mint_token(&self, subject: &str) -> Result<PubSubToken, AppError>;
}
