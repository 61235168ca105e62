//! Persistence seam consumed by the orchestrator.
//!
//! The store is the single source of truth and the arbitration point for
//! idempotency; there is no other shared mutable resource. Everything the
//! engine needs from Postgres lives behind this trait so the tick logic can
//! be exercised against an in-memory double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::error::AppError;
use uuid::Uuid;

use crate::models::{AmountOverride, InsertOutcome, Invoice, NewInvoice, Subscription};

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Active subscriptions whose look-ahead window has opened by `now`.
    /// A coarse pre-filter; the orchestrator re-evaluates eligibility.
    async fn list_due_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, AppError>;

    /// Price history for a subscription, any order.
    async fn list_overrides(&self, subscription_id: Uuid)
        -> Result<Vec<AmountOverride>, AppError>;

    /// How many invoices this subscription has accumulated.
    async fn count_invoices(&self, subscription_id: Uuid) -> Result<i64, AppError>;

    /// Cheap existence pre-check to avoid wasted external payment calls.
    async fn find_invoice(
        &self,
        subscription_id: Uuid,
        cycle_start_utc: DateTime<Utc>,
    ) -> Result<Option<Invoice>, AppError>;

    /// Idempotent invoice write: insert-or-ignore on the
    /// (subscription, cycle-start) unique constraint.
    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<InsertOutcome, AppError>;

    /// Compare-and-set advancement of `next_due_utc`. Returns false when the
    /// stored value no longer matches `previous_due` (another worker already
    /// advanced it), which must be treated as success-by-another-writer.
    async fn advance_schedule(
        &self,
        subscription_id: Uuid,
        previous_due: DateTime<Utc>,
        next_due: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Transition to completed and clear the schedule. Returns true only for
    /// the first caller, so the completion notification fires exactly once.
    async fn complete_subscription(&self, subscription_id: Uuid) -> Result<bool, AppError>;

    /// Merchant-scoped monotonically increasing invoice number.
    async fn next_invoice_number(&self, merchant_id: Uuid) -> Result<i64, AppError>;
}
