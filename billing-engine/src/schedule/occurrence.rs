//! Cycle boundary calculator.
//!
//! An occurrence is `billing_anchor + k * interval`. Day and week intervals
//! are exact durations. Month and year intervals are calendar concepts: the
//! addition happens on the local calendar of the merchant's zone, keeping the
//! anchor's day-of-month where possible and clamping to the last day of the
//! target month otherwise (anchor day 31 in a 28-day month lands on day 28,
//! not day 1 of the following month). The result converts back to UTC for
//! storage and comparison.

use chrono::{DateTime, Duration, LocalResult, Months, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use super::ScheduleError;
use crate::models::IntervalUnit;

/// Upper bound on the catch-up search. A subscription more than this many
/// occurrences behind has corrupt anchor data.
const MAX_OCCURRENCE_SEARCH: u32 = 20_000;

/// Parse a merchant's configured IANA zone name.
pub fn merchant_zone(name: &str) -> Result<Tz, ScheduleError> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone(name.to_string()))
}

/// Compute the UTC instant of occurrence `index` (0 = the anchor itself).
pub fn occurrence_at(
    anchor_utc: DateTime<Utc>,
    unit: IntervalUnit,
    interval_count: i32,
    index: u32,
    tz: Tz,
) -> Result<DateTime<Utc>, ScheduleError> {
    let overflow = || ScheduleError::Overflow {
        anchor: anchor_utc,
        index,
    };

    let steps = u32::try_from(interval_count)
        .ok()
        .and_then(|c| c.checked_mul(index))
        .ok_or_else(overflow)?;

    match unit {
        IntervalUnit::Day => anchor_utc
            .checked_add_signed(Duration::days(i64::from(steps)))
            .ok_or_else(overflow),
        IntervalUnit::Week => anchor_utc
            .checked_add_signed(Duration::weeks(i64::from(steps)))
            .ok_or_else(overflow),
        IntervalUnit::Month => add_months_local(anchor_utc, steps, tz, overflow),
        IntervalUnit::Year => {
            let months = steps.checked_mul(12).ok_or_else(overflow)?;
            add_months_local(anchor_utc, months, tz, overflow)
        }
    }
}

/// Find the earliest occurrence strictly after `after`.
pub fn next_occurrence_after(
    anchor_utc: DateTime<Utc>,
    unit: IntervalUnit,
    interval_count: i32,
    after: DateTime<Utc>,
    tz: Tz,
) -> Result<DateTime<Utc>, ScheduleError> {
    for index in 0..MAX_OCCURRENCE_SEARCH {
        let occurrence = occurrence_at(anchor_utc, unit, interval_count, index, tz)?;
        if occurrence > after {
            return Ok(occurrence);
        }
    }
    Err(ScheduleError::Diverged(after))
}

/// Calendar month addition in the merchant's zone, clamped end-of-month by
/// `chrono::Months` semantics, converted back to UTC.
fn add_months_local<F>(
    anchor_utc: DateTime<Utc>,
    months: u32,
    tz: Tz,
    overflow: F,
) -> Result<DateTime<Utc>, ScheduleError>
where
    F: Fn() -> ScheduleError,
{
    let local = anchor_utc.with_timezone(&tz).naive_local();
    let shifted = local
        .checked_add_months(Months::new(months))
        .ok_or_else(&overflow)?;
    resolve_local(shifted, tz).ok_or_else(overflow)
}

/// Map a local wall-clock time back to UTC. DST ambiguity resolves to the
/// earlier instant; a time inside a spring-forward gap rolls forward until a
/// valid instant exists.
fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            // Gap times (e.g. 02:30 on a spring-forward day) do not exist;
            // try successive hours forward. DST shifts are at most two hours.
            for offset in 1..=3 {
                let candidate = naive + Duration::hours(offset);
                if let LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) =
                    tz.from_local_datetime(&candidate)
                {
                    return Some(dt.with_timezone(&Utc));
                }
            }
            None
        }
    }
}
