//! Authentication extractor.
//!
//! The core never implements its own authentication: an opaque subject identifier is
//! supplied by the identity collaborator (via a bearer token), synced with
//! `IdentityVerifier::sync_user`, then mapped to an existing internal `User` row. A
//! subject with no matching row is unauthenticated as far as the core is concerned —
//! provisioning a `users` row is the identity collaborator's / storefront's job, out of
//! scope here.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::UserRole;

use super::AppState;

/// The authenticated caller for one request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    /// Internal user identifier.
    pub user_id: Uuid,
    /// The caller's role.
    pub role: UserRole,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::NotAuthorized("missing Authorization header".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::NotAuthorized("expected a bearer token".to_string()))?;

        if !state.rate_limiter.check(token, crate::rate_limit::RateLimitCategory::AuthSync).await {
            return Err(AppError::RateLimitExceeded {
                category: crate::rate_limit::RateLimitCategory::AuthSync.tag().to_string(),
            });
        }

        let record = state.identity.sync_user(token).await?;

        let row: Option<(Uuid, UserRole)> =
            sqlx::query_as("SELECT id, role FROM users WHERE external_subject = $1")
                .bind(&record.external_subject)
                .fetch_optional(&state.pool)
                .await?;

        let (user_id, role) = row
            .ok_or_else(|| AppError::NotAuthorized("unknown subject".to_string()))?;

        Ok(AuthUser { user_id, role })
    }
}
