//! The billing engine: eligibility, amount resolution, window calculation,
//! and the orchestrating tick.

pub mod amounts;
pub mod eligibility;
pub mod tick;
pub mod window;

pub use amounts::resolve_amount;
pub use eligibility::is_eligible;
pub use tick::BillingEngine;
pub use window::{invoice_window, InvoiceWindow};

use engine_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::schedule::ScheduleError;

/// Per-subscription failure taxonomy. Everything here aborts one
/// subscription's tick; the next scheduled tick is the retry mechanism.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Corrupt anchor or zone data. Surfaced for operator attention since it
    /// would otherwise stall this subscription's billing indefinitely.
    #[error("calendar computation failed: {0}")]
    Calendar(#[from] ScheduleError),

    /// The external payment request call failed; nothing was mutated.
    #[error("payment request creation failed: {0}")]
    PaymentRequest(String),

    /// Non-duplicate persistence failure; the schedule was not advanced.
    #[error("persistence failed: {0}")]
    Store(#[from] AppError),

    /// An active subscription without a next-due instant is corrupt.
    #[error("subscription {0} is active but has no next due instant")]
    MissingNextDue(Uuid),
}

impl BillingError {
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::Calendar(_) => "calendar",
            BillingError::PaymentRequest(_) => "payment_request",
            BillingError::Store(_) => "store",
            BillingError::MissingNextDue(_) => "missing_next_due",
        }
    }
}
