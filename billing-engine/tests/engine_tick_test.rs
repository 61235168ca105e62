//! Billing tick behavior tests over in-memory doubles.

mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use billing_engine::models::TickOutcome;
use billing_engine::services::NotificationKind;
use common::{engine, monthly_subscription, utc, MockNotifier, MockPayments, MockStore};

#[tokio::test]
async fn generates_invoice_and_advances_schedule() {
    let subscription = monthly_subscription();
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments.clone(), notifier.clone());

    // Due 2024-02-01, look-ahead 3 days: the window opens on 2024-01-29.
    let outcome = engine
        .process_subscription(&subscription, utc("2024-01-29T12:00:00Z"))
        .await;

    assert!(matches!(outcome, TickOutcome::Generated { .. }));

    let invoices = store.invoices();
    assert_eq!(invoices.len(), 1);
    let invoice = &invoices[0];
    assert_eq!(invoice.cycle_start_utc, utc("2024-02-01T00:00:00Z"));
    assert_eq!(
        invoice.due_date,
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    );
    // Expiry: cycle start + past-due threshold (2 days) + 14 days grace.
    assert_eq!(invoice.expires_utc, utc("2024-02-17T00:00:00Z"));
    assert_eq!(invoice.invoice_number, 1);
    assert_eq!(invoice.status, "pending");

    assert_eq!(
        store.subscription(id).next_due_utc,
        Some(utc("2024-03-01T00:00:00Z"))
    );
    assert_eq!(payments.calls(), 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::InvoiceReady);
}

#[tokio::test]
async fn look_ahead_window_not_open_is_a_no_op() {
    let subscription = monthly_subscription();
    let store = MockStore::with_subscription(subscription.clone());
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments.clone(), notifier);

    // One second before the window opens.
    let outcome = engine
        .process_subscription(&subscription, utc("2024-01-28T23:59:59Z"))
        .await;

    assert_eq!(outcome, TickOutcome::SkippedNotEligible);
    assert!(store.invoices().is_empty());
    assert_eq!(payments.calls(), 0);
}

#[tokio::test]
async fn paused_subscription_is_skipped() {
    let mut subscription = monthly_subscription();
    subscription.status = "paused".to_string();
    let store = MockStore::with_subscription(subscription.clone());
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments.clone(), notifier);

    let outcome = engine
        .process_subscription(&subscription, utc("2024-02-15T00:00:00Z"))
        .await;

    assert_eq!(outcome, TickOutcome::SkippedNotEligible);
    assert!(store.invoices().is_empty());
    assert_eq!(payments.calls(), 0);
}

#[tokio::test]
async fn repeated_tick_with_stale_schedule_is_idempotent() {
    let subscription = monthly_subscription();
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments.clone(), notifier);

    let now = utc("2024-01-30T00:00:00Z");
    let first = engine.process_subscription(&subscription, now).await;
    assert!(matches!(first, TickOutcome::Generated { .. }));

    // A second worker still holding the pre-advancement snapshot finds the
    // cycle's invoice and backs off before any payment call.
    let second = engine.process_subscription(&subscription, now).await;
    assert_eq!(second, TickOutcome::SkippedDuplicate);

    assert_eq!(store.invoices().len(), 1);
    assert_eq!(payments.calls(), 1);
    assert_eq!(
        store.subscription(id).next_due_utc,
        Some(utc("2024-03-01T00:00:00Z"))
    );
}

#[tokio::test]
async fn concurrent_ticks_generate_exactly_one_invoice() {
    let subscription = monthly_subscription();
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = Arc::new(engine(store.clone(), payments.clone(), notifier));

    let now = utc("2024-01-30T00:00:00Z");
    let (a, b) = tokio::join!(
        engine.process_subscription(&subscription, now),
        engine.process_subscription(&subscription, now),
    );

    let outcomes = [a, b];
    let generated = outcomes.iter().filter(|o| o.as_str() == "generated").count();
    let skipped = outcomes
        .iter()
        .filter(|o| o.as_str() == "skipped_duplicate")
        .count();
    assert_eq!(generated, 1);
    assert_eq!(skipped, 1);

    assert_eq!(store.invoices().len(), 1);
    // The loser never advances the schedule a second time.
    assert_eq!(
        store.subscription(id).next_due_utc,
        Some(utc("2024-03-01T00:00:00Z"))
    );
}

#[tokio::test]
async fn duplicate_tick_repairs_a_half_finished_cycle() {
    let subscription = monthly_subscription();
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    // A worker persisted the 2024-02-01 invoice, then died before advancing
    // the schedule.
    store.seed_invoice(&subscription, utc("2024-02-01T00:00:00Z"));
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments.clone(), notifier);

    let outcome = engine
        .process_subscription(&subscription, utc("2024-02-02T00:00:00Z"))
        .await;

    // No second invoice and no payment call, but the stranded schedule is
    // advanced so billing does not stall on this cycle forever.
    assert_eq!(outcome, TickOutcome::SkippedDuplicate);
    assert_eq!(store.invoices().len(), 1);
    assert_eq!(payments.calls(), 0);
    assert_eq!(
        store.subscription(id).next_due_utc,
        Some(utc("2024-03-01T00:00:00Z"))
    );

    // The following cycle bills normally.
    let next = engine
        .process_subscription(&store.subscription(id), utc("2024-02-28T00:00:00Z"))
        .await;
    assert!(matches!(next, TickOutcome::Generated { .. }));
    assert_eq!(store.invoices().len(), 2);
    assert_eq!(
        store.subscription(id).next_due_utc,
        Some(utc("2024-04-01T00:00:00Z"))
    );
}

#[tokio::test]
async fn missed_cycles_are_skipped_not_back_billed() {
    let subscription = monthly_subscription();
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments.clone(), notifier);

    // The scheduler was down from late January to June. The recovery tick
    // bills the cycle that was due and jumps the schedule past all missed
    // occurrences in a single step.
    let outcome = engine
        .process_subscription(&subscription, utc("2024-06-10T00:00:00Z"))
        .await;

    assert!(matches!(outcome, TickOutcome::Generated { .. }));
    let invoices = store.invoices();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].cycle_start_utc, utc("2024-02-01T00:00:00Z"));
    assert_eq!(
        store.subscription(id).next_due_utc,
        Some(utc("2024-07-01T00:00:00Z"))
    );
}

#[tokio::test]
async fn completes_after_max_cycles_with_one_completion_notice() {
    let mut subscription = monthly_subscription();
    subscription.max_cycles = Some(3);
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments.clone(), notifier.clone());

    for now in [
        utc("2024-01-29T00:00:00Z"),
        utc("2024-02-28T00:00:00Z"),
        utc("2024-03-29T00:00:00Z"),
    ] {
        let outcome = engine.process_subscription(&store.subscription(id), now).await;
        assert!(matches!(outcome, TickOutcome::Generated { .. }));
    }

    // Cycle limit reached: no fourth invoice, the subscription retires.
    let fourth = engine
        .process_subscription(&store.subscription(id), utc("2024-04-28T00:00:00Z"))
        .await;
    assert_eq!(fourth, TickOutcome::Completed);

    let invoices = store.invoices();
    assert_eq!(invoices.len(), 3);
    assert_eq!(
        invoices.iter().map(|i| i.invoice_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let completed = store.subscription(id);
    assert_eq!(completed.status, "completed");
    assert_eq!(completed.next_due_utc, None);

    // A tick that observes the completed row does nothing further.
    let fifth = engine
        .process_subscription(&store.subscription(id), utc("2024-04-28T00:00:00Z"))
        .await;
    assert_eq!(fifth, TickOutcome::SkippedNotEligible);

    let completion_notices = notifier
        .sent()
        .iter()
        .filter(|n| n.kind == NotificationKind::Completion)
        .count();
    assert_eq!(completion_notices, 1);
}

#[tokio::test]
async fn payment_failure_leaves_no_trace() {
    let subscription = monthly_subscription();
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    let payments = MockPayments::failing();
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments.clone(), notifier.clone());

    let outcome = engine
        .process_subscription(&subscription, utc("2024-01-30T00:00:00Z"))
        .await;

    assert!(matches!(outcome, TickOutcome::Failed { .. }));
    assert!(store.invoices().is_empty());
    assert_eq!(
        store.subscription(id).next_due_utc,
        Some(utc("2024-02-01T00:00:00Z"))
    );
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn notification_failure_does_not_roll_back_billing() {
    let subscription = monthly_subscription();
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    let payments = Arc::new(MockPayments::default());
    let notifier = MockNotifier::failing();
    let engine = engine(store.clone(), payments.clone(), notifier);

    let outcome = engine
        .process_subscription(&subscription, utc("2024-01-30T00:00:00Z"))
        .await;

    assert!(matches!(outcome, TickOutcome::Generated { .. }));
    assert_eq!(store.invoices().len(), 1);
    assert_eq!(
        store.subscription(id).next_due_utc,
        Some(utc("2024-03-01T00:00:00Z"))
    );
}

#[tokio::test]
async fn amount_override_applies_from_effective_date() {
    let mut subscription = monthly_subscription();
    subscription.base_amount = Decimal::new(1000, 2);
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    // Effective before the 2024-02-01 cycle: applies.
    store.add_override(id, "2024-01-15", Decimal::new(1200, 2));
    // Effective after it: ignored for this cycle.
    store.add_override(id, "2024-03-01", Decimal::new(1500, 2));
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments, notifier);

    let outcome = engine
        .process_subscription(&subscription, utc("2024-01-30T00:00:00Z"))
        .await;

    assert!(matches!(outcome, TickOutcome::Generated { .. }));
    assert_eq!(store.invoices()[0].amount, Decimal::new(1200, 2));
}

#[tokio::test]
async fn clamped_cycle_recovers_anchor_day() {
    let mut subscription = monthly_subscription();
    subscription.billing_anchor_utc = utc("2023-01-31T00:00:00Z");
    // February has no 31st; the due occurrence was clamped to the 28th.
    subscription.next_due_utc = Some(utc("2023-02-28T00:00:00Z"));
    let id = subscription.subscription_id;
    let store = MockStore::with_subscription(subscription.clone());
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments, notifier);

    let outcome = engine
        .process_subscription(&subscription, utc("2023-02-27T00:00:00Z"))
        .await;

    assert!(matches!(outcome, TickOutcome::Generated { .. }));
    assert_eq!(
        store.invoices()[0].cycle_start_utc,
        utc("2023-02-28T00:00:00Z")
    );
    // March recovers the anchor's day-of-month.
    assert_eq!(
        store.subscription(id).next_due_utc,
        Some(utc("2023-03-31T00:00:00Z"))
    );
}

#[tokio::test]
async fn run_tick_reports_per_subscription_outcomes() {
    let mut due = monthly_subscription();
    // Long overdue relative to the wall clock run_tick uses.
    due.billing_anchor_utc = utc("2020-01-01T00:00:00Z");
    due.next_due_utc = Some(utc("2020-02-01T00:00:00Z"));
    let due_id = due.subscription_id;

    let mut not_yet = monthly_subscription();
    not_yet.billing_anchor_utc = utc("2099-01-01T00:00:00Z");
    not_yet.next_due_utc = Some(utc("2099-02-01T00:00:00Z"));

    let store = MockStore::with_subscription(due);
    store.upsert_subscription(not_yet);
    let payments = Arc::new(MockPayments::default());
    let notifier = Arc::new(MockNotifier::default());
    let engine = engine(store.clone(), payments, notifier);

    let summary = engine.run_tick().await.unwrap();

    // Only the overdue subscription is a candidate.
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.generated, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.results[0].subscription_id, due_id);

    // Recovery advances the schedule past every missed cycle.
    let next_due = store.subscription(due_id).next_due_utc.unwrap();
    assert!(next_due > chrono::Utc::now());
}
