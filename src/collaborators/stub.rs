//! In-memory collaborator implementations, used by the integration test suite so the
//! orchestrator and ledger can be exercised without live external services.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

use super::{
    IdentityVerifier, PaymentIntent, PaymentProcessor, PubSubService, PubSubToken, RtcRole,
    RtcService, RtcToken, TransferResult, UserRecord,
};

/// Always confirms whatever subject it is asked to sync.
#[derive(Debug, Default)]
pub struct StubIdentityVerifier;

#[async_trait]
impl IdentityVerifier for StubIdentityVerifier {
    async fn sync_user(&self, subject: &str) -> Result<UserRecord, AppError> {
        Ok(UserRecord {
            external_subject: subject.to_string(),
        })
    }
}

/// Records every call it receives so tests can assert on collaborator interactions.
#[derive(Debug, Default)]
pub struct StubPaymentProcessor {
    /// Transfers issued, in call order.
    pub transfers: Mutex<Vec<(Decimal, String)>>,
    /// When set, every `transfer` call fails.
    pub fail_transfers: Mutex<bool>,
}

#[async_trait]
impl PaymentProcessor for StubPaymentProcessor {
    async fn create_intent(&self, amount: Decimal) -> Result<PaymentIntent, AppError> {
        let id = Uuid::new_v4().to_string();
        let _ = amount;
        Ok(PaymentIntent {
            client_secret: format!("{id}_secret"),
            id,
        })
    }

    async fn transfer(&self, amount: Decimal, account_handle: &str) -> Result<TransferResult, AppError> {
        if *self.fail_transfers.lock().expect("stub mutex") {
            return Err(AppError::Transient("stub transfer failure".to_string()));
        }
        self.transfers
            .lock()
            .expect("stub mutex")
            .push((amount, account_handle.to_string()));
        Ok(TransferResult {
            external_transfer_ref: Uuid::new_v4().to_string(),
        })
    }

    fn verify_webhook(&self, body: &[u8], _signature: &str) -> Result<Value, AppError> {
        serde_json::from_slice(body).map_err(|e| AppError::Validation(e.to_string()))
    }
}

/// Mints deterministic, inspectable tokens.
#[derive(Debug, Default)]
pub struct StubRtcService;

#[async_trait]
impl RtcService for StubRtcService {
    async fn mint_token(&self, channel: &str, uid: u32, role: RtcRole) -> Result<RtcToken, AppError> {
        let role_str = match role {
            RtcRole::Publisher => "publisher",
            RtcRole::Subscriber => "subscriber",
        };
        Ok(RtcToken {
            token: format!("stub-rtc-{channel}-{uid}-{role_str}"),
            uid,
            channel: channel.to_string(),
            expires_in_seconds: 24 * 3600,
        })
    }
}

/// Records every publish so tests can assert on event ordering and payloads.
#[derive(Debug, Default)]
pub struct StubPubSubService {
    /// Published events, in call order, as `(channel, event)`.
    pub published: Mutex<Vec<(String, Value)>>,
    /// When set, every `publish` call fails (used to exercise retry behaviour).
    pub fail_publishes: Mutex<bool>,
}

#[async_trait]
impl PubSubService for StubPubSubService {
    async fn publish(&self, channel: &str, event: Value) -> Result<(), AppError> {
        if *self.fail_publishes.lock().expect("stub mutex") {
            return Err(AppError::Transient("stub publish failure".to_string()));
        }
        self.published
            .lock()
            .expect("stub mutex")
            .push((channel.to_string(), event));
        Ok(())
    }

    async fn mint_token(&self, subject: &str) -> Result<PubSubToken, AppError> {
        Ok(PubSubToken {
            token: format!("stub-pubsub-{subject}"),
            expires_in_seconds: 3600,
        })
    }
}
