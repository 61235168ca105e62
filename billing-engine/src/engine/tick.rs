//! Orchestrator: the billing tick.
//!
//! One tick walks every due subscription through a strictly sequential
//! pipeline: eligibility, completion gate, idempotency pre-check, amount
//! resolution, window calculation, invoice numbering, external payment
//! request, idempotent persistence, schedule advancement, notification.
//! Subscriptions are independent units of work and run concurrently; one
//! subscription's failure never aborts the tick for the others.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;
use tracing::{info, warn};

use super::{amounts::resolve_amount, eligibility::is_eligible, window::invoice_window, BillingError};
use crate::models::{InsertOutcome, NewInvoice, Subscription, SubscriptionStatus, TickOutcome, TickSummary};
use crate::schedule::{advance_past, merchant_zone};
use crate::services::{
    metrics::{
        record_error, record_invoice_amount, record_invoice_generated, record_tick_duration,
        record_tick_outcome,
    },
    BillingStore, Notification, NotificationKind, Notifications, NewPaymentRequest,
    PaymentRequests,
};

/// The recurring billing engine. Stateless between ticks except via the
/// persistence layer, so any number of instances may run the same tick.
pub struct BillingEngine {
    store: Arc<dyn BillingStore>,
    payments: Arc<dyn PaymentRequests>,
    notifier: Arc<dyn Notifications>,
    concurrency: usize,
}

impl BillingEngine {
    pub fn new(
        store: Arc<dyn BillingStore>,
        payments: Arc<dyn PaymentRequests>,
        notifier: Arc<dyn Notifications>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            payments,
            notifier,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one billing tick over every due subscription.
    #[tracing::instrument(skip(self))]
    pub async fn run_tick(&self) -> Result<TickSummary, BillingError> {
        let started = Instant::now();
        let now = Utc::now();

        let due = self.store.list_due_subscriptions(now).await?;
        info!(candidates = due.len(), "Billing tick started");

        let outcomes = stream::iter(due)
            .map(|subscription| async move {
                let id = subscription.subscription_id;
                let outcome = self.process_subscription(&subscription, now).await;
                (id, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut summary = TickSummary::default();
        for (subscription_id, outcome) in outcomes {
            record_tick_outcome(outcome.as_str());
            summary.record(subscription_id, outcome);
        }

        record_tick_duration(started.elapsed().as_secs_f64());
        info!(
            processed = summary.processed,
            generated = summary.generated,
            skipped_not_eligible = summary.skipped_not_eligible,
            skipped_duplicate = summary.skipped_duplicate,
            completed = summary.completed,
            failed = summary.failed,
            "Billing tick finished"
        );

        Ok(summary)
    }

    /// Process one subscription, folding failures into its outcome so they
    /// stay isolated from the rest of the tick.
    pub async fn process_subscription(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        match self.try_process(subscription, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                record_error(e.kind());
                warn!(
                    subscription_id = %subscription.subscription_id,
                    error = %e,
                    "Subscription tick failed; will retry next tick"
                );
                TickOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_process(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, BillingError> {
        if subscription.status() != SubscriptionStatus::Active {
            return Ok(TickOutcome::SkippedNotEligible);
        }

        let next_due = subscription
            .next_due_utc
            .ok_or(BillingError::MissingNextDue(subscription.subscription_id))?;

        if !is_eligible(now, next_due, subscription.generate_days_in_advance) {
            return Ok(TickOutcome::SkippedNotEligible);
        }

        // The completion gate runs before any invoice work so the cycle
        // after the last one never produces an extra invoice.
        let cycle_count = self
            .store
            .count_invoices(subscription.subscription_id)
            .await?;
        if let Some(max_cycles) = subscription.max_cycles {
            if cycle_count >= i64::from(max_cycles) {
                let first_writer = self
                    .store
                    .complete_subscription(subscription.subscription_id)
                    .await?;
                if first_writer {
                    self.dispatch(
                        subscription,
                        NotificationKind::Completion,
                        json!({ "cycles_billed": cycle_count }),
                    )
                    .await;
                }
                return Ok(TickOutcome::Completed);
            }
        }

        // The upcoming occurrence is the stored next-due instant itself; it
        // is also the idempotency key for this cycle.
        let cycle_start = next_due;

        // Resolve all calendar math up front: a corrupt anchor must fail the
        // subscription before any external call mutates anything.
        //
        // Advancement walks from the anchor past max(cycle_start, now): if
        // the scheduler was down for several intervals, the schedule lands
        // past every missed cycle in one step and the missed ones are never
        // billed. Only this tick's cycle gets an invoice.
        let tz = merchant_zone(&subscription.merchant_timezone)?;
        let advanced_due = advance_past(
            subscription.billing_anchor_utc,
            subscription.interval_unit(),
            subscription.interval_count,
            cycle_start.max(now),
            tz,
        )?;

        if self
            .store
            .find_invoice(subscription.subscription_id, cycle_start)
            .await?
            .is_some()
        {
            // This cycle's invoice already exists, but the writer that
            // created it may have died before advancing the schedule.
            // Re-issuing the compare-and-set repairs that case and is a
            // no-op when the writer already advanced.
            self.repair_schedule(subscription, cycle_start, advanced_due)
                .await?;
            return Ok(TickOutcome::SkippedDuplicate);
        }

        let cycle_date = cycle_start.with_timezone(&tz).date_naive();
        let overrides = self
            .store
            .list_overrides(subscription.subscription_id)
            .await?;
        let amount = resolve_amount(subscription.base_amount, &overrides, cycle_date);

        let window = invoice_window(
            cycle_start,
            subscription.invoice_due_days,
            subscription.past_due_after_days,
            tz,
        );

        let invoice_number = self
            .store
            .next_invoice_number(subscription.merchant_id)
            .await?;

        let payment = self
            .payments
            .create(NewPaymentRequest {
                merchant_id: subscription.merchant_id,
                amount,
                currency: subscription.currency.clone(),
                single_use: true,
                expires_at: window.expires_utc,
                accepted_currencies: subscription.accepted_currencies.clone(),
            })
            .await
            .map_err(|e| BillingError::PaymentRequest(e.to_string()))?;

        let new_invoice = NewInvoice {
            subscription_id: subscription.subscription_id,
            merchant_id: subscription.merchant_id,
            payment_request_ref: payment.request_ref,
            payment_url: payment.payable_url,
            cycle_start_utc: cycle_start,
            due_date: window.due_date,
            expires_utc: window.expires_utc,
            amount,
            currency: subscription.currency.clone(),
            invoice_number,
        };

        let invoice = match self.store.insert_invoice(&new_invoice).await? {
            InsertOutcome::Inserted(invoice) => invoice,
            // Another tick won the race for this cycle. The winner normally
            // advances the schedule, but if it died first the repair below
            // does it; the compare-and-set cannot double-advance.
            InsertOutcome::Duplicate => {
                self.repair_schedule(subscription, cycle_start, advanced_due)
                    .await?;
                return Ok(TickOutcome::SkippedDuplicate);
            }
        };

        // Only after a verified invoice write does the schedule move. The
        // compare-and-set may find the schedule already advanced by a racer;
        // that is success-by-another-writer, not an error.
        let advanced = self
            .store
            .advance_schedule(subscription.subscription_id, cycle_start, advanced_due)
            .await?;
        if !advanced {
            warn!(
                subscription_id = %subscription.subscription_id,
                "Schedule already advanced by another worker"
            );
        }

        record_invoice_generated(&subscription.merchant_id.to_string());
        record_invoice_amount(
            &subscription.merchant_id.to_string(),
            &subscription.currency,
            amount.to_f64().unwrap_or(0.0),
        );

        self.dispatch(
            subscription,
            NotificationKind::InvoiceReady,
            json!({
                "invoice_id": invoice.invoice_id,
                "invoice_number": invoice.invoice_number,
                "amount": invoice.amount,
                "currency": invoice.currency,
                "due_date": invoice.due_date,
                "payment_url": invoice.payment_url,
            }),
        )
        .await;

        Ok(TickOutcome::Generated {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.invoice_number,
        })
    }

    /// Advance a schedule left behind by a writer that created this cycle's
    /// invoice but died before advancing. A no-op when `next_due_utc` has
    /// already moved past `cycle_start`; without it the subscription would
    /// report duplicates forever while never billing another cycle.
    async fn repair_schedule(
        &self,
        subscription: &Subscription,
        cycle_start: DateTime<Utc>,
        advanced_due: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        let repaired = self
            .store
            .advance_schedule(subscription.subscription_id, cycle_start, advanced_due)
            .await?;
        if repaired {
            warn!(
                subscription_id = %subscription.subscription_id,
                cycle_start = %cycle_start,
                next_due = %advanced_due,
                "Recovered a schedule stranded by an interrupted tick"
            );
        }
        Ok(())
    }

    /// Best-effort notification dispatch. Failures are logged and never roll
    /// back billing work.
    async fn dispatch(
        &self,
        subscription: &Subscription,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) {
        let result = self
            .notifier
            .notify(Notification {
                kind,
                subscription_id: subscription.subscription_id,
                recipient: subscription.customer_id,
                payload,
            })
            .await;

        if let Err(e) = result {
            record_error("notification");
            warn!(
                subscription_id = %subscription.subscription_id,
                kind = kind.as_str(),
                error = %e,
                "Notification dispatch failed; billing proceeds"
            );
        }
    }
}
