//! HTTP surface: the `axum` router and shared application state.

mod auth;
mod handlers;

pub use auth::AuthUser;

use axum::http::{header, Method};
use axum::routing::{get, patch, post};
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::collaborators::IdentityVerifier;
use crate::config::AppConfig;
use crate::event_bus::EventBus;
use crate::ledger::Ledger;
use crate::notifications::NotificationStore;
use crate::orchestrator::SessionOrchestrator;
use crate::presence::PresenceRegistry;
use crate::rate_limit::RateLimiter;
use crate::reviews::ReviewAggregator;
use crate::token_broker::TokenBroker;

/// Shared application state, constructed once at startup and cloned (cheaply, via `Arc`
/// internals) into every request.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide configuration.
    pub config: AppConfig,
    /// Connection pool, used directly by the auth extractor and webhook handler.
    pub pool: PgPool,
    /// Session lifecycle FSM.
    pub orchestrator: SessionOrchestrator,
    /// Monetary ledger.
    pub ledger: Ledger,
    /// Reader presence registry.
    pub presence: PresenceRegistry,
    /// RTC/pub-sub token minting.
    pub token_broker: Arc<TokenBroker>,
    /// Durable notification inbox.
    pub notifications: NotificationStore,
    /// Review submission and response.
    pub reviews: ReviewAggregator,
    /// Per-subject rate limiting.
    pub rate_limiter: Arc<RateLimiter>,
    /// Pub/sub + notification fan-out, used directly by the payment webhook handler.
    pub event_bus: EventBus,
    /// Payment collaborator, used directly by the webhook handler to verify signatures.
    pub payments: Arc<dyn crate::collaborators::PaymentProcessor>,
    /// Identity collaborator, used directly by the auth extractor.
    pub identity: Arc<dyn IdentityVerifier>,
}

/// Builds the full router: CORS, request tracing, rate limiting, and every route in the
/// external interface.
pub fn build_router(state: AppState) -> Router {
    let allow_origin = state
        .config
        .frontend_url
        .parse::<axum::http::HeaderValue>()
        .map(tower_http::cors::AllowOrigin::exact)
        .unwrap_or_else(|_| tower_http::cors::AllowOrigin::any());

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/sessions/request", post(handlers::request_session))
        .route("/sessions/{id}/accept", post(handlers::accept_session))
        .route("/sessions/{id}/decline", post(handlers::decline_session))
        .route("/sessions/{id}/end", post(handlers::end_session))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/sessions/{id}/messages", post(handlers::send_message))
        .route("/sessions/{id}/review", post(handlers::submit_review))
        .route(
            "/sessions/{id}/review/respond",
            post(handlers::respond_to_review),
        )
        .route("/payments/add-funds", post(handlers::add_funds))
        .route("/payments/reader/payout", post(handlers::reader_payout))
        .route("/readers/me/status", patch(handlers::set_status))
        .route("/readers/online", get(handlers::list_online))
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/{id}/read", patch(handlers::mark_notification_read))
        .route("/webhooks/payments", post(handlers::payments_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
