//! Error handling module for the reading marketplace core.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors surfaced to callers across the HTTP surface and the components behind it.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed request; not retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller lacks role or ownership; not retried.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Addressed entity missing; not retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// State-machine transition rejected; not retried.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Client balance below required reserve.
    #[error("insufficient balance: need at least {required}, have {available}")]
    InsufficientBalance {
        /// Minimum balance required to proceed.
        required: rust_decimal::Decimal,
        /// Balance actually observed.
        available: rust_decimal::Decimal,
    },

    /// Requested payout amount is below the configured minimum.
    #[error("amount must be at least the minimum payout of {minimum}")]
    BelowMinPayout {
        /// The configured minimum payout amount.
        minimum: rust_decimal::Decimal,
    },

    /// Reader's payout account is not active with the external processor.
    #[error("payout account is not active")]
    AccountNotActive,

    /// Reader presence check failed or lost the race.
    #[error("reader unavailable")]
    ReaderUnavailable,

    /// Per-subject rate limit breached, tagged with the failing category.
    #[error("rate limit exceeded: {category}")]
    RateLimitExceeded {
        /// The rate-limit category that rejected the request.
        category: String,
    },

    /// Duplicate action (review twice, conflicting external reference, concurrent accept loser).
    #[error("conflict: {0}")]
    Conflict(String),

    /// External collaborator timed out or failed; safe to retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// Unexpected failure; logged loudly, never surfaced to the response body.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Wire-level error code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION",
            AppError::NotAuthorized(_) => "NOT_AUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AppError::BelowMinPayout { .. } => "BELOW_MIN_PAYOUT",
            AppError::AccountNotActive => "ACCOUNT_NOT_ACTIVE",
            AppError::ReaderUnavailable => "READER_UNAVAILABLE",
            AppError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Transient(_) => "TRANSIENT_ERROR",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            AppError::BelowMinPayout { .. } => StatusCode::BAD_REQUEST,
            AppError::AccountNotActive => StatusCode::BAD_REQUEST,
            AppError::ReaderUnavailable => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Transient(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Internal errors never leak their cause.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "database error");
        AppError::Transient(format!("database error: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status();
        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.code(),
                message: self.public_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}
