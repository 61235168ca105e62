//! Schedule advancer.
//!
//! After a successful invoice write the subscription's next-due instant moves
//! to the first occurrence strictly after the previous one. Walking from the
//! anchor (rather than adding one interval to the previous value) means a
//! scheduler that was down for several intervals lands past all missed cycles
//! in a single step, without ever generating invoices for them; only the next
//! upcoming cycle is billed.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::{occurrence::next_occurrence_after, ScheduleError};
use crate::models::IntervalUnit;

/// Compute the next-due instant following `previous_due`.
///
/// The result is always a valid occurrence of the anchor series and always
/// strictly greater than `previous_due`, which keeps the stored schedule
/// monotonically non-decreasing.
pub fn advance_past(
    anchor_utc: DateTime<Utc>,
    unit: IntervalUnit,
    interval_count: i32,
    previous_due: DateTime<Utc>,
    tz: Tz,
) -> Result<DateTime<Utc>, ScheduleError> {
    next_occurrence_after(anchor_utc, unit, interval_count, previous_due, tz)
}
