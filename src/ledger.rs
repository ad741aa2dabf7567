//! Ledger: the single source of truth for monetary movement.
//!
//! Every state-changing operation runs inside one `sqlx::Transaction`, locking the
//! involved profile rows with `SELECT ... FOR UPDATE` in ascending identifier order to
//! avoid deadlocking against a concurrent settlement touching the same two users. All
//! amounts are
//! [`rust_decimal::Decimal`] at 2-decimal precision; `money::compute_charge` and
//! `money::scale_charge` own the arithmetic, this module owns the persistence.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::collaborators::PaymentProcessor;
use crate::error::AppError;
use crate::model::{AccountStatus, PayoutStatus, Transaction as Txn, TransactionStatus, TransactionType};
use crate::money::ChargeSplit;
use std::sync::Arc;

/// Owns client balances, reader pending/paid earnings, and the append-only transaction
/// journal.
#[derive(Clone)]
pub struct Ledger {
    pool: PgPool,
    payments: Arc<dyn PaymentProcessor>,
    min_payout: Decimal,
}

impl Ledger {
    /// Creates a new ledger.
    pub fn new(pool: PgPool, payments: Arc<dyn PaymentProcessor>, min_payout: Decimal) -> Self {
        Self {
            pool,
            payments,
            min_payout,
        }
    }

    /// Credits `user`'s client balance by `amount` and journals a completed `deposit`.
    /// Idempotent by `external_ref`: a repeat call with the same reference returns the
    /// original transaction without double-crediting.
    #[tracing::instrument(skip(self))]
    pub async fn deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        external_ref: &str,
    ) -> Result<Txn, AppError> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = sqlx::query_as::<_, Txn>(
            r#"
            SELECT id, user_id, session_id, transaction_type, amount, fee, net_amount,
                   status, external_ref, created_at
            FROM transactions
            WHERE external_ref = $1
            "#,
        )
        .bind(external_ref)
        .fetch_optional(&mut *tx)
        .await?
        {
            return Ok(existing);
        }

        sqlx::query("SELECT user_id FROM client_profiles WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("client profile not found".to_string()))?;

        sqlx::query(
            "UPDATE client_profiles SET balance = balance + $1 WHERE user_id = $2",
        )
        .bind(amount)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let txn = insert_transaction(
            &mut tx,
            user_id,
            None,
            TransactionType::Deposit,
            amount,
            Decimal::ZERO,
            TransactionStatus::Completed,
            Some(external_ref),
        )
        .await?;

        tx.commit().await?;
        Ok(txn)
    }

    /// Settles a session within the caller's transaction: locks both profile rows in
    /// ascending id order, re-reads the client's live balance, scales the charge to what
    /// the balance can actually cover, applies both sides of the ledger, and journals the
    /// pair of transactions. Returns the final `ChargeSplit` and whether settlement was
    /// partial.
    ///
    /// Takes the transaction rather than opening its own: the journal rows it inserts
    /// carry a foreign key to the session row, which the orchestrator holds `FOR UPDATE`
    /// for the duration of `end`, so settling on a second connection would block that
    /// insert on the first connection's still-open lock.
    #[tracing::instrument(skip(self, tx))]
    pub async fn settle_session(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        session_id: Uuid,
        client_id: Uuid,
        reader_id: Uuid,
        computed: ChargeSplit,
    ) -> Result<(ChargeSplit, bool), AppError> {
        let (first, second) = if client_id <= reader_id {
            (client_id, reader_id)
        } else {
            (reader_id, client_id)
        };
        lock_profile_pair(tx, first, second).await?;

        let (balance,): (Decimal,) =
            sqlx::query_as("SELECT balance FROM client_profiles WHERE user_id = $1")
                .bind(client_id)
                .fetch_one(&mut **tx)
                .await?;

        let charged = balance.min(computed.total_amount);
        let partial = charged < computed.total_amount;
        let split = if partial {
            crate::money::scale_charge(computed, charged)
        } else {
            computed
        };

        sqlx::query(
            "UPDATE client_profiles SET balance = balance - $1, total_spent = total_spent + $1 WHERE user_id = $2",
        )
        .bind(charged)
        .bind(client_id)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            "UPDATE reader_profiles SET pending_balance = pending_balance + $1, total_earned = total_earned + $1 WHERE user_id = $2",
        )
        .bind(split.reader_earnings)
        .bind(reader_id)
        .execute(&mut **tx)
        .await?;

        insert_transaction(
            tx,
            client_id,
            Some(session_id),
            TransactionType::ReadingPayment,
            charged,
            split.platform_fee,
            TransactionStatus::Completed,
            None,
        )
        .await?;
        insert_transaction(
            tx,
            reader_id,
            Some(session_id),
            TransactionType::ReadingEarning,
            split.reader_earnings,
            Decimal::ZERO,
            TransactionStatus::Completed,
            None,
        )
        .await?;

        Ok((split, partial))
    }

    /// Debits `reader.pending_balance` by `amount`, credits `total_paid_out`, and journals
    /// a completed `payout` transaction. Called after a successful external transfer,
    /// whether triggered by the scheduled sweep or a manual request.
    #[tracing::instrument(skip(self))]
    pub async fn record_payout(
        &self,
        reader_id: Uuid,
        amount: Decimal,
        external_transfer_ref: &str,
    ) -> Result<Txn, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT user_id FROM reader_profiles WHERE user_id = $1 FOR UPDATE")
            .bind(reader_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("reader profile not found".to_string()))?;

        sqlx::query(
            "UPDATE reader_profiles SET pending_balance = pending_balance - $1, total_paid_out = total_paid_out + $1 WHERE user_id = $2",
        )
        .bind(amount)
        .bind(reader_id)
        .execute(&mut *tx)
        .await?;

        let txn = insert_transaction(
            &mut tx,
            reader_id,
            None,
            TransactionType::Payout,
            amount,
            Decimal::ZERO,
            TransactionStatus::Completed,
            Some(external_transfer_ref),
        )
        .await?;

        tx.commit().await?;
        Ok(txn)
    }

    /// Admin-only. Marks `transaction_id` refunded, journals a new `refund` transaction,
    /// and — for a `deposit` or `reading_payment` original — credits the client's balance.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, transaction_id: Uuid, reason: &str) -> Result<Txn, AppError> {
        let mut tx = self.pool.begin().await?;

        let original = sqlx::query_as::<_, Txn>(
            r#"
            SELECT id, user_id, session_id, transaction_type, amount, fee, net_amount,
                   status, external_ref, created_at
            FROM transactions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("transaction not found".to_string()))?;

        if original.status == TransactionStatus::Refunded {
            return Err(AppError::InvalidState("transaction already refunded".to_string()));
        }

        sqlx::query("UPDATE transactions SET status = 'refunded' WHERE id = $1")
            .bind(transaction_id)
            .execute(&mut *tx)
            .await?;

        if matches!(
            original.transaction_type,
            TransactionType::Deposit | TransactionType::ReadingPayment
        ) {
            sqlx::query("UPDATE client_profiles SET balance = balance + $1 WHERE user_id = $2")
                .bind(original.net_amount)
                .bind(original.user_id)
                .execute(&mut *tx)
                .await?;
        }

        // `external_ref` carries a partial UNIQUE index for external-processor idempotency
        // keys; the refund reason is free text and must not collide on it, so it's recorded
        // only in the tracing span (captured above via `reason` as an instrument field) and
        // left out of the journal row.
        let refund_txn = insert_transaction(
            &mut tx,
            original.user_id,
            original.session_id,
            TransactionType::Refund,
            original.net_amount,
            Decimal::ZERO,
            TransactionStatus::Completed,
            None,
        )
        .await?;

        tx.commit().await?;
        Ok(refund_txn)
    }

    /// Reader-initiated payout outside the scheduled sweep. Preconditions: `amount ≥
    /// min_payout`, `reader.pending_balance ≥ amount`, `reader.external_account_status =
    /// active`. Creates a `processing` payout row, calls the payment collaborator, then
    /// `record_payout` on success or marks the row `failed` on failure.
    #[tracing::instrument(skip(self))]
    pub async fn manual_payout(&self, reader_id: Uuid, amount: Decimal) -> Result<Uuid, AppError> {
        if amount < self.min_payout {
            return Err(AppError::BelowMinPayout {
                minimum: self.min_payout,
            });
        }

        let (pending_balance, external_account_handle, external_account_status): (
            Decimal,
            Option<String>,
            AccountStatus,
        ) = sqlx::query_as(
            "SELECT pending_balance, external_account_handle, external_account_status FROM reader_profiles WHERE user_id = $1",
        )
        .bind(reader_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("reader profile not found".to_string()))?;

        if external_account_status != AccountStatus::Active {
            return Err(AppError::AccountNotActive);
        }
        if pending_balance < amount {
            return Err(AppError::Validation(
                "pending balance is below the requested amount".to_string(),
            ));
        }
        let account_handle = external_account_handle
            .ok_or_else(|| AppError::InvalidState("no payout account on file".to_string()))?;

        let payout_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO payouts (id, reader_id, amount, status)
            VALUES ($1, $2, $3, 'processing')
            "#,
        )
        .bind(payout_id)
        .bind(reader_id)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        match self.payments.transfer(amount, &account_handle).await {
            Ok(result) => {
                self.record_payout(reader_id, amount, &result.external_transfer_ref)
                    .await?;
                sqlx::query(
                    "UPDATE payouts SET status = $1, external_transfer_ref = $2, completed_at = now() WHERE id = $3",
                )
                .bind(PayoutStatus::Completed)
                .bind(&result.external_transfer_ref)
                .bind(payout_id)
                .execute(&self.pool)
                .await?;
                Ok(payout_id)
            }
            Err(err) => {
                sqlx::query("UPDATE payouts SET status = $1, completed_at = now() WHERE id = $2")
                    .bind(PayoutStatus::Failed)
                    .bind(payout_id)
                    .execute(&self.pool)
                    .await?;
                Err(err)
            }
        }
    }

    /// Asks the payment collaborator to create a payment-intent for `amount`. Does not
    /// touch the ledger; a balance credit only happens when the corresponding webhook
    /// arrives and calls `deposit`.
    #[tracing::instrument(skip(self))]
    pub async fn init_deposit(&self, amount: Decimal) -> Result<crate::collaborators::PaymentIntent, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
        self.payments.create_intent(amount).await
    }
}

/// Locks both profile rows (client and reader) in ascending identifier order, regardless
/// of which is the client and which is the reader, to prevent deadlock against a
/// concurrent settlement touching the same two users in the opposite role.
async fn lock_profile_pair(
    tx: &mut Transaction<'_, Postgres>,
    first: Uuid,
    second: Uuid,
) -> Result<(), AppError> {
    lock_profile_row(tx, first).await?;
    lock_profile_row(tx, second).await?;
    Ok(())
}

/// Locks whichever profile row(s) `user_id` owns. A user has at most one of a
/// client/reader profile, but we don't know which here, so we probe both; Postgres
/// does not support `FOR UPDATE` over a `UNION`, so these are two plain locking selects
/// rather than one.
async fn lock_profile_row(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<(), AppError> {
    sqlx::query("SELECT user_id FROM client_profiles WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
    sqlx::query("SELECT user_id FROM reader_profiles WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn insert_transaction(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    session_id: Option<Uuid>,
    transaction_type: TransactionType,
    amount: Decimal,
    fee: Decimal,
    status: TransactionStatus,
    external_ref: Option<&str>,
) -> Result<Txn, AppError> {
    let txn = sqlx::query_as::<_, Txn>(
        r#"
        INSERT INTO transactions
            (id, user_id, session_id, transaction_type, amount, fee, net_amount, status, external_ref)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, user_id, session_id, transaction_type, amount, fee, net_amount,
                  status, external_ref, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(session_id)
    .bind(transaction_type)
    .bind(amount)
    .bind(fee)
    .bind(amount - fee)
    .bind(status)
    .bind(external_ref)
    .fetch_one(&mut **tx)
    .await?;
    Ok(txn)
}
