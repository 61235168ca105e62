//! Subscription model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription lifecycle status.
///
/// `Paused` and `Canceled` are written by collaborators outside the engine;
/// the engine itself only ever moves a subscription to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Completed,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Completed => "completed",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paused" => SubscriptionStatus::Paused,
            "completed" => SubscriptionStatus::Completed,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Active,
        }
    }
}

/// Recurrence interval unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "day" => IntervalUnit::Day,
            "week" => IntervalUnit::Week,
            "year" => IntervalUnit::Year,
            _ => IntervalUnit::Month,
        }
    }
}

/// Recurring billing agreement.
///
/// `next_due_utc` is always an occurrence of `billing_anchor_utc + k * interval`
/// (k >= 0) and never decreases over the subscription's lifetime. It is null
/// once the subscription is completed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub merchant_id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub base_amount: Decimal,
    pub currency: String,
    pub interval_unit: String,
    pub interval_count: i32,
    pub billing_anchor_utc: DateTime<Utc>,
    pub next_due_utc: Option<DateTime<Utc>>,
    pub status: String,
    pub max_cycles: Option<i32>,
    pub invoice_due_days: i32,
    pub generate_days_in_advance: i32,
    pub past_due_after_days: i32,
    pub merchant_timezone: String,
    pub fee_config: Option<serde_json::Value>,
    pub accepted_currencies: Vec<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    pub fn interval_unit(&self) -> IntervalUnit {
        IntervalUnit::from_string(&self.interval_unit)
    }

    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_string(&self.status)
    }
}

/// Input for creating a subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub merchant_id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub base_amount: Decimal,
    pub currency: String,
    pub interval_unit: IntervalUnit,
    pub interval_count: i32,
    pub billing_anchor_utc: DateTime<Utc>,
    pub max_cycles: Option<i32>,
    pub invoice_due_days: i32,
    pub generate_days_in_advance: i32,
    pub past_due_after_days: i32,
    pub merchant_timezone: String,
    pub fee_config: Option<serde_json::Value>,
    pub accepted_currencies: Vec<String>,
}
