mod common;

use common::{ScriptedOracle, processed, processing, quick_policy};
use loyalty_accrual::application::dispatcher::{IntakeConfig, ReconciliationPipeline};
use loyalty_accrual::application::ledger::LedgerApplier;
use loyalty_accrual::application::orders::{OrderService, SubmitOutcome};
use loyalty_accrual::application::reconciler::PollPolicy;
use loyalty_accrual::application::withdrawals::BalanceService;
use loyalty_accrual::domain::account::UserId;
use loyalty_accrual::domain::accrual::OracleStatus;
use loyalty_accrual::domain::money::Money;
use loyalty_accrual::domain::order::OrderStatus;
use loyalty_accrual::error::{LoyaltyError, OracleError};
use loyalty_accrual::infrastructure::in_memory::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    oracle: Arc<ScriptedOracle>,
    orders: OrderService,
    balances: BalanceService,
    pipeline: ReconciliationPipeline,
}

fn harness(policy: PollPolicy) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let oracle = ScriptedOracle::new();
    let pipeline = ReconciliationPipeline::start(
        IntakeConfig::default(),
        policy,
        oracle.clone(),
        LedgerApplier::new(store.clone()),
    );
    Harness {
        orders: OrderService::new(store.clone(), pipeline.intake()),
        balances: BalanceService::new(store),
        oracle,
        pipeline,
    }
}

const ALICE_ORDER: &str = "79927398713";

#[tokio::test(start_paused = true)]
async fn test_alice_order_is_credited_after_processing() {
    let h = harness(PollPolicy::default());
    let alice = UserId::new("alice");
    h.oracle.script(
        ALICE_ORDER,
        vec![
            processing(ALICE_ORDER),
            processing(ALICE_ORDER),
            processed(ALICE_ORDER, 30050),
        ],
    );

    let outcome = h.orders.submit_order(&alice, ALICE_ORDER).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Accepted);

    // first poll at 10s reports PROCESSING, which is recorded
    tokio::time::sleep(Duration::from_secs(15)).await;
    let orders = h.orders.orders(&alice).await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::Processing);
    assert_eq!(h.balances.balance(&alice).await.unwrap().current, Money::ZERO);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let orders = h.orders.orders(&alice).await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::Processed);
    assert_eq!(orders[0].accrual, Some(Money::from_minor(30050)));
    assert_eq!(
        h.balances.balance(&alice).await.unwrap().current,
        Money::from_minor(30050)
    );
    assert_eq!(h.oracle.calls(ALICE_ORDER), 3);

    let report = h.pipeline.shutdown().await.unwrap();
    assert_eq!(report.credited, 1);
}

#[tokio::test(start_paused = true)]
async fn test_resubmission_does_not_credit_twice() {
    let h = harness(quick_policy());
    let alice = UserId::new("alice");
    h.oracle
        .script(ALICE_ORDER, vec![processed(ALICE_ORDER, 500)]);

    h.orders.submit_order(&alice, ALICE_ORDER).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let again = h.orders.submit_order(&alice, ALICE_ORDER).await.unwrap();
    assert_eq!(again, SubmitOutcome::AlreadySubmitted);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(
        h.balances.balance(&alice).await.unwrap().current,
        Money::from_minor(500)
    );
    assert_eq!(h.oracle.calls(ALICE_ORDER), 1);

    let report = h.pipeline.shutdown().await.unwrap();
    assert_eq!(report.credited, 1);
    assert_eq!(report.finished(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_order_of_another_user_conflicts() {
    let h = harness(quick_policy());
    h.orders
        .submit_order(&UserId::new("alice"), ALICE_ORDER)
        .await
        .unwrap();

    let result = h
        .orders
        .submit_order(&UserId::new("bob"), ALICE_ORDER)
        .await;

    assert!(matches!(result, Err(LoyaltyError::Conflict(_))));
    assert!(h.orders.orders(&UserId::new("bob")).await.unwrap().is_empty());
    h.pipeline.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stuck_order_is_given_up_unchanged() {
    let h = harness(PollPolicy::default());
    let alice = UserId::new("alice");

    h.orders.submit_order(&alice, ALICE_ORDER).await.unwrap();
    tokio::time::sleep(Duration::from_secs(180)).await;

    // twelve polls fit exactly in the two-minute window
    assert_eq!(h.oracle.calls(ALICE_ORDER), 12);
    let orders = h.orders.orders(&alice).await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::Processing);
    assert_eq!(orders[0].accrual, None);
    assert_eq!(h.balances.balance(&alice).await.unwrap().current, Money::ZERO);

    let report = h.pipeline.shutdown().await.unwrap();
    assert_eq!(report.given_up, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_and_abandoned_orders_are_not_credited() {
    let h = harness(quick_policy());
    let alice = UserId::new("alice");
    let invalid = "12345678903";
    let garbled = "4561261212345467";
    h.oracle.script(
        invalid,
        vec![Ok(common::report(invalid, OracleStatus::Invalid, None))],
    );
    h.oracle.script(
        garbled,
        vec![Err(OracleError::Permanent("malformed body".into()))],
    );

    h.orders.submit_order(&alice, invalid).await.unwrap();
    h.orders.submit_order(&alice, garbled).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let orders = h.orders.orders(&alice).await.unwrap();
    let status_of = |n: &str| {
        orders
            .iter()
            .find(|o| o.number.as_str() == n)
            .map(|o| o.status)
    };
    assert_eq!(status_of(invalid), Some(OrderStatus::Invalid));
    assert_eq!(status_of(garbled), Some(OrderStatus::New));
    assert_eq!(h.balances.balance(&alice).await.unwrap().current, Money::ZERO);

    let report = h.pipeline.shutdown().await.unwrap();
    assert_eq!(report.invalidated, 1);
    assert_eq!(report.abandoned, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_polling_and_intake() {
    let h = harness(PollPolicy::default());
    let alice = UserId::new("alice");
    h.orders.submit_order(&alice, ALICE_ORDER).await.unwrap();

    tokio::time::sleep(Duration::from_secs(25)).await;
    let intake_orders = h.orders.clone();
    let report = h.pipeline.shutdown().await.unwrap();
    assert_eq!(report.cancelled, 1);
    assert_eq!(h.oracle.calls(ALICE_ORDER), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.oracle.calls(ALICE_ORDER), 2);

    let late = intake_orders.submit_order(&alice, "12345678903").await;
    assert!(matches!(late, Err(LoyaltyError::QueueClosed)));
}
