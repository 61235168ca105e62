//! Invoice model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status. The engine only ever writes `Pending`; later transitions
/// belong to the payment-confirmation collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    PastDue,
    Expired,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::PastDue => "past_due",
            InvoiceStatus::Expired => "expired",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => InvoiceStatus::Paid,
            "past_due" => InvoiceStatus::PastDue,
            "expired" => InvoiceStatus::Expired,
            _ => InvoiceStatus::Pending,
        }
    }
}

/// One billing occurrence's immutable record.
///
/// (subscription_id, cycle_start_utc) is globally unique; it is the sole
/// idempotency key of the engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub subscription_id: Uuid,
    pub merchant_id: Uuid,
    pub payment_request_ref: String,
    pub payment_url: String,
    pub cycle_start_utc: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub expires_utc: DateTime<Utc>,
    pub amount: Decimal,
    pub currency: String,
    pub invoice_number: i64,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

/// Input for the idempotent invoice write.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub subscription_id: Uuid,
    pub merchant_id: Uuid,
    pub payment_request_ref: String,
    pub payment_url: String,
    pub cycle_start_utc: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub expires_utc: DateTime<Utc>,
    pub amount: Decimal,
    pub currency: String,
    pub invoice_number: i64,
}

/// Result of the idempotent invoice write.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// This caller created the row.
    Inserted(Invoice),
    /// Another writer already holds this (subscription, cycle) slot.
    Duplicate,
}
