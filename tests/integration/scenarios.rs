//! End-to-end scenarios driving the real orchestrator/ledger/presence/payout-scheduler
//! stack against a live Postgres instance.

use crate::fixtures::{Harness, CHAT};
use reading_core::error::AppError;
use reading_core::model::{AccountStatus, ReaderPresence, SessionStatus};
use rust_decimal_macros::dec;
use serial_test::serial;

/// Backdates a session's `start_time` so `end` bills a known duration without the test
/// actually waiting out the clock.
async fn backdate_start(harness: &Harness, session_id: uuid::Uuid, seconds_ago: i64) {
    sqlx::query("UPDATE sessions SET start_time = now() - ($2 || ' seconds')::interval WHERE id = $1")
        .bind(session_id)
        .bind(seconds_ago.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
async fn happy_path_ninety_second_chat_session() {
    let h = Harness::new().await;
    let client = h.seed_client(dec!(10.00)).await;
    let reader = h.seed_reader(dec!(1.00)).await;

    let requested = h.orchestrator.request(client, reader, CHAT).await.unwrap();
    assert_eq!(requested.status, SessionStatus::Pending);

    let accepted = h.orchestrator.accept(reader, requested.id).await.unwrap();
    assert_eq!(accepted.session.status, SessionStatus::Active);
    assert_eq!(h.presence.current(reader).await.unwrap(), ReaderPresence::InSession);

    backdate_start(&h, requested.id, 90).await;

    let ended = h.orchestrator.end(client, requested.id).await.unwrap();
    assert_eq!(ended.status, SessionStatus::Completed);
    assert_eq!(ended.duration_seconds, Some(90));
    assert_eq!(ended.total_amount, Some(dec!(2.00)));
    assert_eq!(ended.platform_fee, Some(dec!(0.60)));
    assert_eq!(ended.reader_earnings, Some(dec!(1.40)));
    assert!(!ended.is_partial_settlement());
    assert_eq!(h.presence.current(reader).await.unwrap(), ReaderPresence::Online);

    let (balance,): (rust_decimal::Decimal,) =
        sqlx::query_as("SELECT balance FROM client_profiles WHERE user_id = $1")
            .bind(client)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(balance, dec!(8.00));
}

#[tokio::test]
#[serial]
async fn request_rejected_when_balance_below_reserve() {
    let h = Harness::new().await;
    let client = h.seed_client(dec!(0.50)).await;
    let reader = h.seed_reader(dec!(1.00)).await;

    let err = h.orchestrator.request(client, reader, CHAT).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance { required, available }
        if required == dec!(3.00) && available == dec!(0.50)));
}

#[tokio::test]
#[serial]
async fn losing_side_of_an_accept_race_is_cancelled() {
    let h = Harness::new().await;
    let client_a = h.seed_client(dec!(10.00)).await;
    let client_b = h.seed_client(dec!(10.00)).await;
    let reader = h.seed_reader(dec!(1.00)).await;

    let session_a = h.orchestrator.request(client_a, reader, CHAT).await.unwrap();
    let session_b = h.orchestrator.request(client_b, reader, CHAT).await.unwrap();

    h.orchestrator.accept(reader, session_a.id).await.unwrap();

    let err = h.orchestrator.accept(reader, session_b.id).await.unwrap_err();
    assert!(matches!(err, AppError::ReaderUnavailable));

    let lost = h.orchestrator.get(session_b.id).await.unwrap();
    assert_eq!(lost.status, SessionStatus::Cancelled);
    assert_eq!(lost.notes.as_deref(), Some("reader_already_in_session"));
}

#[tokio::test]
#[serial]
async fn settlement_scales_down_to_whatever_balance_remains() {
    let h = Harness::new().await;
    let client = h.seed_client(dec!(3.50)).await;
    let reader = h.seed_reader(dec!(1.00)).await;

    // The reserve check at request time only requires 3x the rate (3.00), not the
    // eventual total, so a session that simply runs long enough (4 minutes = 4.00) can
    // still outrun a balance that passed that check.
    let requested = h.orchestrator.request(client, reader, CHAT).await.unwrap();
    h.orchestrator.accept(reader, requested.id).await.unwrap();
    backdate_start(&h, requested.id, 240).await;

    let ended = h.orchestrator.end(client, requested.id).await.unwrap();
    assert_eq!(ended.total_amount, Some(dec!(3.50)));
    assert!(ended.is_partial_settlement());

    let (balance,): (rust_decimal::Decimal,) =
        sqlx::query_as("SELECT balance FROM client_profiles WHERE user_id = $1")
            .bind(client)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(balance, dec!(0.00));
}

#[tokio::test]
#[serial]
async fn ending_a_completed_session_twice_does_not_resettle() {
    let h = Harness::new().await;
    let client = h.seed_client(dec!(10.00)).await;
    let reader = h.seed_reader(dec!(1.00)).await;

    let requested = h.orchestrator.request(client, reader, CHAT).await.unwrap();
    h.orchestrator.accept(reader, requested.id).await.unwrap();
    backdate_start(&h, requested.id, 60).await;

    let first = h.orchestrator.end(client, requested.id).await.unwrap();
    let second = h.orchestrator.end(client, requested.id).await.unwrap();
    assert_eq!(first.total_amount, second.total_amount);
    assert_eq!(first.updated_at, second.updated_at);

    let (balance,): (rust_decimal::Decimal,) =
        sqlx::query_as("SELECT balance FROM client_profiles WHERE user_id = $1")
            .bind(client)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(balance, dec!(9.00));
}

#[tokio::test]
#[serial]
async fn payout_sweep_skips_readers_below_the_floor_and_pays_those_above_it() {
    let h = Harness::new().await;
    let below_floor = h.seed_reader(dec!(1.00)).await;
    let above_floor = h.seed_reader(dec!(1.00)).await;

    h.set_reader_pending_balance(below_floor, dec!(5.00), AccountStatus::Active).await;
    h.set_reader_pending_balance(above_floor, dec!(20.00), AccountStatus::Active).await;

    let report = h.payout_scheduler.run_sweep().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);

    let (below_balance,): (rust_decimal::Decimal,) =
        sqlx::query_as("SELECT pending_balance FROM reader_profiles WHERE user_id = $1")
            .bind(below_floor)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(below_balance, dec!(5.00));

    let (above_balance,): (rust_decimal::Decimal,) =
        sqlx::query_as("SELECT pending_balance FROM reader_profiles WHERE user_id = $1")
            .bind(above_floor)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(above_balance, dec!(0.00));
    assert_eq!(h.payments.transfers.lock().unwrap().len(), 1);
}
