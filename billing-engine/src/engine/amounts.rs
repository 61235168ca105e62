//! Amount resolver.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::AmountOverride;

/// Resolve the price in effect for a cycle date.
///
/// The override with the latest `effective_from <= cycle_date` wins; absent
/// any match the subscription's base amount applies. Deterministic and
/// side-effect-free regardless of the order overrides arrive in.
pub fn resolve_amount(
    base_amount: Decimal,
    overrides: &[AmountOverride],
    cycle_date: NaiveDate,
) -> Decimal {
    overrides
        .iter()
        .filter(|o| o.effective_from <= cycle_date)
        .max_by_key(|o| o.effective_from)
        .map(|o| o.amount)
        .unwrap_or(base_amount)
}
