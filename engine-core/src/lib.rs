//! engine-core: Shared infrastructure for the billing engine.
pub mod config;
pub mod error;
pub mod observability;
