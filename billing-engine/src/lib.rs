//! Recurring subscription billing engine.
//!
//! Decides when each subscription's next billing cycle is due, generates
//! exactly one invoice per cycle, advances the schedule only after a verified
//! invoice write, and drives subscriptions to completion without
//! double-billing or skipping cycles, even under concurrent ticks.

pub mod config;
pub mod engine;
pub mod models;
pub mod schedule;
pub mod services;
pub mod startup;
