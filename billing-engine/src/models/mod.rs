//! Domain models for the billing engine.

mod amount_override;
mod invoice;
mod outcome;
mod subscription;

pub use amount_override::AmountOverride;
pub use invoice::{InsertOutcome, Invoice, InvoiceStatus, NewInvoice};
pub use outcome::{SubscriptionResult, TickOutcome, TickSummary};
pub use subscription::{CreateSubscription, IntervalUnit, Subscription, SubscriptionStatus};
