//! Cycle boundary calculation and schedule advancement.

mod advance;
mod occurrence;

pub use advance::advance_past;
pub use occurrence::{merchant_zone, next_occurrence_after, occurrence_at};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Calendar computation failures. Fatal for the affected subscription and
/// surfaced for operator attention; silently swallowing one would stall
/// billing indefinitely.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("unknown merchant timezone '{0}'")]
    UnknownTimezone(String),

    #[error("calendar arithmetic overflowed computing occurrence {index} from anchor {anchor}")]
    Overflow { anchor: DateTime<Utc>, index: u32 },

    #[error("no occurrence found after {0} within the search bound")]
    Diverged(DateTime<Utc>),
}
