//! Request handlers for the external HTTP surface, one per route in `mod.rs`.
//!
//! Each handler validates the minimum it needs, checks the relevant rate-limit category,
//! and delegates to the owning component: thin function, shared state pulled from
//! `axum::extract::State`, domain errors propagated via `?` and rendered by `AppError`'s
//! `IntoResponse`.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::collaborators::RtcRole;
use crate::error::AppError;
use crate::model::{ReaderPresence, SessionStatus, SessionType};
use crate::rate_limit::RateLimitCategory;

use super::{AppState, AuthUser};

#[derive(Serialize)]
struct SuccessEnvelope<T: Serialize> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(SuccessEnvelope {
        success: true,
        data,
    })
    .into_response()
}

async fn require(
    state: &AppState,
    subject: Uuid,
    category: RateLimitCategory,
) -> Result<(), AppError> {
    if state.rate_limiter.check(&subject.to_string(), category).await {
        Ok(())
    } else {
        Err(AppError::RateLimitExceeded {
            category: category.tag().to_string(),
        })
    }
}

#[derive(Deserialize)]
pub struct RequestSessionBody {
    reader_id: Uuid,
    session_type: SessionType,
}

pub async fn request_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<RequestSessionBody>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::SessionRequest).await?;
    let session = state
        .orchestrator
        .request(auth.user_id, body.reader_id, body.session_type)
        .await?;
    Ok(ok(session))
}

pub async fn accept_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::General).await?;
    let result = state.orchestrator.accept(auth.user_id, id).await?;
    Ok(ok(serde_json::json!({
        "session": result.session,
        "rtc_token": result.rtc_token.token,
        "uid": result.rtc_token.uid,
        "channel": result.rtc_token.channel,
    })))
}

#[derive(Deserialize, Default)]
pub struct DeclineBody {
    reason: Option<String>,
}

pub async fn decline_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<DeclineBody>>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::General).await?;
    let reason = body.and_then(|Json(b)| b.reason);
    let session = state
        .orchestrator
        .decline(auth.user_id, id, reason.as_deref())
        .await?;
    Ok(ok(session))
}

pub async fn end_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::General).await?;
    let session = state.orchestrator.end(auth.user_id, id).await?;
    Ok(ok(session))
}

pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::General).await?;
    let session = state.orchestrator.get(id).await?;
    if !session.is_party(auth.user_id) {
        return Err(AppError::NotAuthorized("not a party to this session".to_string()));
    }
    if session.status == SessionStatus::Active {
        let rtc_token = state
            .token_broker
            .mint_rtc_token(auth.user_id, &session.rtc_channel, RtcRole::Publisher)
            .await?;
        return Ok(ok(serde_json::json!({
            "session": session,
            "rtc_token": rtc_token.token,
            "uid": rtc_token.uid,
            "channel": rtc_token.channel,
        })));
    }
    Ok(ok(session))
}

#[derive(Deserialize)]
pub struct SendMessageBody {
    body: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageBody>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::Message).await?;
    let message = state
        .orchestrator
        .send_message(auth.user_id, id, &payload.body)
        .await?;
    Ok(ok(message))
}

#[derive(Deserialize)]
pub struct SubmitReviewBody {
    rating: i16,
    comment: Option<String>,
}

pub async fn submit_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitReviewBody>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::General).await?;
    let review = state
        .reviews
        .submit_review(auth.user_id, id, body.rating, body.comment.as_deref())
        .await?;
    Ok(ok(review))
}

#[derive(Deserialize)]
pub struct RespondToReviewBody {
    response: String,
}

pub async fn respond_to_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RespondToReviewBody>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::General).await?;
    let review = state
        .reviews
        .respond_to_review(auth.user_id, id, &body.response)
        .await?;
    Ok(ok(review))
}

#[derive(Deserialize)]
pub struct AddFundsBody {
    amount: Decimal,
}

pub async fn add_funds(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<AddFundsBody>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::Payment).await?;
    let intent = state.ledger.init_deposit(body.amount).await?;
    Ok(ok(serde_json::json!({
        "payment_intent_id": intent.id,
        "client_secret": intent.client_secret,
    })))
}

#[derive(Deserialize)]
pub struct ReaderPayoutBody {
    amount: Decimal,
}

pub async fn reader_payout(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<ReaderPayoutBody>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::Payment).await?;
    let payout_id = state.ledger.manual_payout(auth.user_id, body.amount).await?;
    Ok(ok(serde_json::json!({ "payout_id": payout_id })))
}

#[derive(Deserialize)]
pub struct SetStatusBody {
    status: ReaderPresence,
}

pub async fn set_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SetStatusBody>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::General).await?;
    state.presence.set(auth.user_id, body.status).await?;
    Ok(ok(serde_json::json!({ "status": body.status })))
}

pub async fn list_online(State(state): State<AppState>) -> Result<Response, AppError> {
    let readers = state.presence.list_online().await?;
    Ok(ok(readers))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::General).await?;
    let notifications = state.notifications.list_for_user(auth.user_id).await?;
    Ok(ok(notifications))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    require(&state, auth.user_id, RateLimitCategory::General).await?;
    let notification = state.notifications.mark_read(auth.user_id, id).await?;
    Ok(ok(notification))
}

/// Ingests a payment-intent success/failure event. Idempotent by payment-intent id
/// (`deposit`'s `external_ref`). Signature verification happens before the body is parsed
/// as JSON so a forged payload never reaches domain logic.
pub async fn payments_webhook(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("missing webhook signature".to_string()))?;
    let payload: Value = state.payments.verify_webhook(&body, signature)?;

    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation("missing event type".to_string()))?;
    if event_type != "payment_intent.succeeded" {
        return Ok(ok(serde_json::json!({ "ignored": true })));
    }

    let payment_intent_id = payload
        .get("payment_intent_id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation("missing payment_intent_id".to_string()))?;
    let user_id = payload
        .get("user_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::Validation("missing user_id".to_string()))?;
    let amount = payload
        .get("amount")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Decimal>().ok())
        .ok_or_else(|| AppError::Validation("missing amount".to_string()))?;

    let txn = state
        .ledger
        .deposit(user_id, amount, payment_intent_id)
        .await?;
    Ok(ok(txn))
}
