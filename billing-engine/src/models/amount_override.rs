//! Amount override model: append-only price history.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A price change effective from a calendar date onward. Immutable once
/// created; consulted, never mutated, during invoice creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AmountOverride {
    pub override_id: Uuid,
    pub subscription_id: Uuid,
    pub effective_from: NaiveDate,
    pub amount: Decimal,
    pub created_utc: DateTime<Utc>,
}
