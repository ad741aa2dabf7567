//! Payout Scheduler: the daily sweep that pays readers out to the external processor.
//!
//! Grounded on the same periodic-task shape the orchestrator's stale-pending sweep uses —
//! both are `tokio::time::interval` loops over a narrow, idempotent unit of work.

use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::collaborators::PaymentProcessor;
use crate::error::AppError;
use crate::event_bus::EventBus;
use crate::ledger::Ledger;
use crate::model::PayoutStatus;

/// How long a `processing` payout row may sit with no external transfer reference before
/// the scheduler considers it abandoned (e.g. the process crashed mid-transfer) and
/// sweeps it into `failed` ahead of a new run.
const RETRY_HORIZON_MINUTES: i64 = 30;

/// Runs the daily payout sweep: pays every reader above the minimum payout threshold and
/// with an active external account.
#[derive(Clone)]
pub struct PayoutScheduler {
    pool: PgPool,
    ledger: Ledger,
    payments: Arc<dyn PaymentProcessor>,
    event_bus: EventBus,
    min_payout: Decimal,
}

/// Outcome of one scheduler run.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Readers paid out successfully.
    pub succeeded: u32,
    /// Readers whose transfer failed.
    pub failed: u32,
}

impl PayoutScheduler {
    /// Creates a new payout scheduler.
    pub fn new(
        pool: PgPool,
        ledger: Ledger,
        payments: Arc<dyn PaymentProcessor>,
        event_bus: EventBus,
        min_payout: Decimal,
    ) -> Self {
        Self {
            pool,
            ledger,
            payments,
            event_bus,
            min_payout,
        }
    }

    /// Sweeps stuck `processing` rows from a prior run into `failed` before starting a new
    /// one, so a crash mid-transfer never leaves a reader's pending balance double-counted.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_stuck_payouts(&self) -> Result<u64, AppError> {
        let horizon = ChronoDuration::minutes(RETRY_HORIZON_MINUTES);
        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET status = 'failed', completed_at = now()
            WHERE status = 'processing'
              AND external_transfer_ref IS NULL
              AND created_at < now() - ($1 || ' minutes')::interval
            "#,
        )
        .bind(horizon.num_minutes().to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Runs one full sweep: selects every eligible reader, pays each out in its own
    /// isolated unit of work, and never lets one reader's failure block another's.
    #[tracing::instrument(skip(self))]
    pub async fn run_sweep(&self) -> Result<SweepReport, AppError> {
        self.reconcile_stuck_payouts().await?;

        let eligible: Vec<(Uuid, Decimal)> = sqlx::query_as(
            r#"
            SELECT user_id, pending_balance FROM reader_profiles
            WHERE pending_balance >= $1 AND external_account_status = 'active'::account_status
            "#,
        )
        .bind(self.min_payout)
        .fetch_all(&self.pool)
        .await?;

        let mut report = SweepReport::default();
        for (reader_id, amount) in eligible {
            match self.pay_one(reader_id, amount).await {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    tracing::warn!(%reader_id, %err, "scheduled payout failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn pay_one(&self, reader_id: Uuid, amount: Decimal) -> Result<(), AppError> {
        let account_handle: Option<String> =
            sqlx::query_scalar("SELECT external_account_handle FROM reader_profiles WHERE user_id = $1")
                .bind(reader_id)
                .fetch_optional(&self.pool)
                .await?
                .flatten();
        let Some(account_handle) = account_handle else {
            return Err(AppError::InvalidState("no payout account on file".to_string()));
        };

        let payout_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO payouts (id, reader_id, amount, status) VALUES ($1, $2, $3, 'processing')",
        )
        .bind(payout_id)
        .bind(reader_id)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        match self.payments.transfer(amount, &account_handle).await {
            Ok(result) => {
                self.ledger
                    .record_payout(reader_id, amount, &result.external_transfer_ref)
                    .await?;
                sqlx::query(
                    "UPDATE payouts SET status = $1, external_transfer_ref = $2, completed_at = now() WHERE id = $3",
                )
                .bind(PayoutStatus::Completed)
                .bind(&result.external_transfer_ref)
                .bind(payout_id)
                .execute(&self.pool)
                .await?;
                Ok(())
            }
            Err(err) => {
                sqlx::query("UPDATE payouts SET status = $1, completed_at = now() WHERE id = $2")
                    .bind(PayoutStatus::Failed)
                    .bind(payout_id)
                    .execute(&self.pool)
                    .await?;
                self.event_bus
                    .notify(
                        reader_id,
                        "payout_failed",
                        "Payout failed",
                        "Your scheduled payout could not be completed.",
                        serde_json::json!({ "amount": amount }),
                    )
                    .await?;
                Err(err)
            }
        }
    }
}
