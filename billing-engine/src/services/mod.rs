//! Services module for the billing engine.

pub mod database;
pub mod metrics;
pub mod notify;
pub mod payment;
pub mod store;

pub use database::Database;
pub use metrics::{
    get_metrics, init_metrics, record_error, record_invoice_amount, record_invoice_generated,
    record_tick_duration, record_tick_outcome,
};
pub use notify::{Notification, NotificationApiClient, NotificationKind, Notifications};
pub use payment::{NewPaymentRequest, PaymentApiClient, PaymentApiConfig, PaymentRequest, PaymentRequests};
pub use store::BillingStore;
