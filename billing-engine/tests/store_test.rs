//! PostgreSQL store integration tests.
//!
//! These exercise the concurrency arbitration the database provides: the
//! unique cycle constraint, compare-and-set schedule advancement, the
//! first-writer completion transition, and merchant-scoped numbering.

mod common;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use billing_engine::models::{InsertOutcome, NewInvoice, Subscription};
use billing_engine::services::BillingStore;
use common::{monthly_create_input, spawn_test_db};

fn new_invoice_for(subscription: &Subscription, invoice_number: i64) -> NewInvoice {
    let cycle_start = subscription.next_due_utc.expect("scheduled subscription");
    NewInvoice {
        subscription_id: subscription.subscription_id,
        merchant_id: subscription.merchant_id,
        payment_request_ref: format!("pr_{invoice_number:06}"),
        payment_url: format!("https://pay.example.com/pr_{invoice_number:06}"),
        cycle_start_utc: cycle_start,
        due_date: cycle_start.date_naive(),
        expires_utc: cycle_start + chrono::Duration::days(16),
        amount: subscription.base_amount,
        currency: subscription.currency.clone(),
        invoice_number,
    }
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn new_subscription_is_scheduled_at_its_anchor() {
    let db = spawn_test_db().await;

    let input = monthly_create_input();
    let subscription = db.create_subscription(&input).await.unwrap();

    assert_eq!(subscription.next_due_utc, Some(input.billing_anchor_utc));
    assert_eq!(subscription.status, "active");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn insert_invoice_is_idempotent_per_cycle() {
    let db = spawn_test_db().await;
    let subscription = db.create_subscription(&monthly_create_input()).await.unwrap();

    let first = db.insert_invoice(&new_invoice_for(&subscription, 1)).await.unwrap();
    assert!(matches!(first, InsertOutcome::Inserted(_)));

    // Same (subscription, cycle) slot: the constraint swallows the write.
    let second = db.insert_invoice(&new_invoice_for(&subscription, 2)).await.unwrap();
    assert!(matches!(second, InsertOutcome::Duplicate));

    assert_eq!(db.count_invoices(subscription.subscription_id).await.unwrap(), 1);
    let surviving = db
        .find_invoice(
            subscription.subscription_id,
            subscription.next_due_utc.unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(surviving.invoice_number, 1);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn advance_schedule_is_compare_and_set() {
    let db = spawn_test_db().await;
    let subscription = db.create_subscription(&monthly_create_input()).await.unwrap();

    let previous = subscription.next_due_utc.unwrap();
    let next = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

    assert!(db
        .advance_schedule(subscription.subscription_id, previous, next)
        .await
        .unwrap());

    // A second worker holding the stale value loses the CAS.
    assert!(!db
        .advance_schedule(subscription.subscription_id, previous, next)
        .await
        .unwrap());

    let stored = db
        .get_subscription(subscription.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.next_due_utc, Some(next));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn complete_subscription_first_writer_wins() {
    let db = spawn_test_db().await;
    let subscription = db.create_subscription(&monthly_create_input()).await.unwrap();

    assert!(db.complete_subscription(subscription.subscription_id).await.unwrap());
    assert!(!db.complete_subscription(subscription.subscription_id).await.unwrap());

    let stored = db
        .get_subscription(subscription.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "completed");
    assert_eq!(stored.next_due_utc, None);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn invoice_numbers_are_merchant_scoped_and_sequential() {
    let db = spawn_test_db().await;
    let merchant_a = Uuid::new_v4();
    let merchant_b = Uuid::new_v4();

    assert_eq!(db.next_invoice_number(merchant_a).await.unwrap(), 1);
    assert_eq!(db.next_invoice_number(merchant_b).await.unwrap(), 1);
    assert_eq!(db.next_invoice_number(merchant_a).await.unwrap(), 2);
    assert_eq!(db.next_invoice_number(merchant_a).await.unwrap(), 3);
    assert_eq!(db.next_invoice_number(merchant_b).await.unwrap(), 2);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn list_due_subscriptions_honors_look_ahead() {
    let db = spawn_test_db().await;

    let near = db.create_subscription(&monthly_create_input()).await.unwrap();

    let mut far_input = monthly_create_input();
    far_input.billing_anchor_utc = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let far = db.create_subscription(&far_input).await.unwrap();

    // Look-ahead is 3 days; 2023-12-30 opens the window for the 2024-01-01
    // anchor only.
    let now = Utc.with_ymd_and_hms(2023, 12, 30, 0, 0, 0).unwrap();
    let due = db.list_due_subscriptions(now).await.unwrap();
    let ids: Vec<Uuid> = due.iter().map(|s| s.subscription_id).collect();

    assert!(ids.contains(&near.subscription_id));
    assert!(!ids.contains(&far.subscription_id));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn overrides_come_back_in_effective_order() {
    let db = spawn_test_db().await;
    let subscription = db.create_subscription(&monthly_create_input()).await.unwrap();
    let id = subscription.subscription_id;

    db.create_amount_override(id, "2024-03-01".parse().unwrap(), Decimal::new(1500, 2))
        .await
        .unwrap();
    db.create_amount_override(id, "2024-01-15".parse().unwrap(), Decimal::new(1200, 2))
        .await
        .unwrap();

    let overrides = db.list_overrides(id).await.unwrap();
    assert_eq!(overrides.len(), 2);
    assert_eq!(overrides[0].amount, Decimal::new(1200, 2));
    assert_eq!(overrides[1].amount, Decimal::new(1500, 2));
}
