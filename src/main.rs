//! Binary entry point: wires every component together and serves the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use reading_core::collaborators::http::{
    HttpIdentityVerifier, HttpPaymentProcessor, HttpPubSubService, HttpRtcService,
};
use reading_core::collaborators::{IdentityVerifier, PaymentProcessor, PubSubService, RtcService};
use reading_core::config::AppConfig;
use reading_core::db;
use reading_core::event_bus::EventBus;
use reading_core::http::{build_router, AppState};
use reading_core::ledger::Ledger;
use reading_core::logger::setup_logger;
use reading_core::notifications::NotificationStore;
use reading_core::orchestrator::SessionOrchestrator;
use reading_core::payout::PayoutScheduler;
use reading_core::presence::PresenceRegistry;
use reading_core::rate_limit::RateLimiter;
use reading_core::reviews::ReviewAggregator;
use reading_core::token_broker::TokenBroker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logger();

    let config = AppConfig::from_env();
    let pool = db::connect(&config.database_url).await?;

    let identity: Arc<dyn IdentityVerifier> = Arc::new(HttpIdentityVerifier::new(
        config.identity_base_url.clone(),
        config.identity_verify_key.clone(),
    ));
    let payments: Arc<dyn PaymentProcessor> = Arc::new(HttpPaymentProcessor::new(
        config.payment_base_url.clone(),
        config.payment_processor_secret.clone(),
        config.payment_webhook_secret.clone(),
    ));
    let rtc: Arc<dyn RtcService> = Arc::new(HttpRtcService::new(
        config.rtc_base_url.clone(),
        config.rtc_app_id.clone(),
    ));
    let pubsub: Arc<dyn PubSubService> = Arc::new(HttpPubSubService::new(
        config.pubsub_base_url.clone(),
        config.pubsub_api_key.clone(),
    ));

    let notifications = NotificationStore::new(pool.clone());
    let event_bus = EventBus::new(pubsub.clone(), notifications.clone());
    let presence = PresenceRegistry::new(pool.clone(), event_bus.clone());
    let token_broker = TokenBroker::new(rtc.clone(), pubsub.clone());
    let ledger = Ledger::new(pool.clone(), payments.clone(), config.min_payout);
    let orchestrator = SessionOrchestrator::new(
        pool.clone(),
        ledger.clone(),
        presence.clone(),
        token_broker.clone(),
        event_bus.clone(),
        config.platform_fee,
        config.session_timeout_minutes,
    );
    let reviews = ReviewAggregator::new(pool.clone(), event_bus.clone());
    let payout_scheduler = PayoutScheduler::new(
        pool.clone(),
        ledger.clone(),
        payments.clone(),
        event_bus.clone(),
        config.min_payout,
    );
    let rate_limiter = Arc::new(RateLimiter::new());

    spawn_stale_pending_sweep(orchestrator.clone());
    spawn_payout_sweep(payout_scheduler);

    let state = AppState {
        config: config.clone(),
        pool,
        orchestrator,
        ledger,
        presence,
        token_broker: Arc::new(token_broker),
        notifications,
        reviews,
        rate_limiter,
        event_bus,
        payments,
        identity,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "reading-core listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs the pending-session timeout sweep every minute.
fn spawn_stale_pending_sweep(orchestrator: SessionOrchestrator) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(err) = orchestrator.sweep_stale_pending().await {
                tracing::warn!(%err, "stale pending sweep failed");
            }
        }
    });
}

/// Runs the payout sweep once a day. Reconciles stuck rows from the prior run first.
fn spawn_payout_sweep(scheduler: PayoutScheduler) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(24 * 3600));
        loop {
            interval.tick().await;
            match scheduler.run_sweep().await {
                Ok(report) => {
                    tracing::info!(succeeded = report.succeeded, failed = report.failed, "payout sweep complete");
                }
                Err(err) => tracing::error!(%err, "payout sweep failed"),
            }
        }
    });
}
