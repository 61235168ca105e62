//! Due/expiry window calculator.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Days past the past-due point before the underlying payment request is
/// invalidated, giving dunning collaborators time to act.
const EXPIRY_GRACE_DAYS: i64 = 14;

/// The invoice's due date and absolute expiry instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceWindow {
    pub due_date: NaiveDate,
    pub expires_utc: DateTime<Utc>,
}

/// Due date is the cycle-start date (merchant zone) plus `invoice_due_days`;
/// expiry is the cycle-start instant plus `past_due_after_days` plus a fixed
/// grace buffer.
pub fn invoice_window(
    cycle_start_utc: DateTime<Utc>,
    invoice_due_days: i32,
    past_due_after_days: i32,
    tz: Tz,
) -> InvoiceWindow {
    let cycle_date = cycle_start_utc.with_timezone(&tz).date_naive();
    InvoiceWindow {
        due_date: cycle_date + Duration::days(i64::from(invoice_due_days)),
        expires_utc: cycle_start_utc
            + Duration::days(i64::from(past_due_after_days) + EXPIRY_GRACE_DAYS),
    }
}
