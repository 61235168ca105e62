//! Eligibility evaluator.

use chrono::{DateTime, Duration, Utc};

/// Whether "now" has reached the look-ahead window for the next cycle.
///
/// Eligible when `now >= next_due - generate_days_in_advance`. A subscription
/// that is not yet eligible is skipped with no side effects on this tick.
pub fn is_eligible(
    now: DateTime<Utc>,
    next_due_utc: DateTime<Utc>,
    generate_days_in_advance: i32,
) -> bool {
    now >= next_due_utc - Duration::days(i64::from(generate_days_in_advance))
}
