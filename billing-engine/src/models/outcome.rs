//! Per-subscription tick outcomes.

use serde::Serialize;
use uuid::Uuid;

/// What happened to one subscription during a billing tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TickOutcome {
    /// A new invoice was persisted and the schedule advanced.
    Generated { invoice_id: Uuid, invoice_number: i64 },
    /// The look-ahead window has not opened yet. No side effects.
    SkippedNotEligible,
    /// Another writer already created this cycle's invoice. The schedule is
    /// advanced only if that writer failed to; it can never move twice for
    /// one cycle.
    SkippedDuplicate,
    /// The configured cycle limit was reached; the subscription is done.
    Completed,
    /// This subscription's tick aborted; safe to retry next tick.
    Failed { reason: String },
}

impl TickOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::Generated { .. } => "generated",
            TickOutcome::SkippedNotEligible => "skipped_not_eligible",
            TickOutcome::SkippedDuplicate => "skipped_duplicate",
            TickOutcome::Completed => "completed",
            TickOutcome::Failed { .. } => "failed",
        }
    }
}

/// Outcome of one subscription within a tick, for the operator log.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResult {
    pub subscription_id: Uuid,
    pub outcome: TickOutcome,
}

/// Aggregate view of one tick run.
#[derive(Debug, Default, Serialize)]
pub struct TickSummary {
    pub processed: usize,
    pub generated: usize,
    pub skipped_not_eligible: usize,
    pub skipped_duplicate: usize,
    pub completed: usize,
    pub failed: usize,
    pub results: Vec<SubscriptionResult>,
}

impl TickSummary {
    pub fn record(&mut self, subscription_id: Uuid, outcome: TickOutcome) {
        self.processed += 1;
        match &outcome {
            TickOutcome::Generated { .. } => self.generated += 1,
            TickOutcome::SkippedNotEligible => self.skipped_not_eligible += 1,
            TickOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            TickOutcome::Completed => self.completed += 1,
            TickOutcome::Failed { .. } => self.failed += 1,
        }
        self.results.push(SubscriptionResult {
            subscription_id,
            outcome,
        });
    }
}
