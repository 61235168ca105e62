//! Metrics module for the billing engine.
//! Prometheus metrics for tick execution and per-merchant invoice volume.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram, register_histogram_vec, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "billing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Tick duration histogram
pub static TICK_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Per-subscription tick outcomes counter
pub static TICK_OUTCOMES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Invoices generated counter (per-merchant metering)
pub static INVOICES_GENERATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Invoice amount counter by currency (monetary tracking)
pub static INVOICE_AMOUNT_TOTAL: OnceLock<prometheus::CounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    TICK_DURATION.get_or_init(|| {
        register_histogram!(histogram_opts!(
            "billing_tick_duration_seconds",
            "Billing tick duration",
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]
        ))
        .expect("Failed to register TICK_DURATION")
    });

    TICK_OUTCOMES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_tick_outcomes_total",
                "Per-subscription tick outcomes"
            ),
            &["outcome"]
        )
        .expect("Failed to register TICK_OUTCOMES_TOTAL")
    });

    INVOICES_GENERATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_invoices_generated_total",
                "Invoices generated by merchant"
            ),
            &["merchant_id"]
        )
        .expect("Failed to register INVOICES_GENERATED_TOTAL")
    });

    INVOICE_AMOUNT_TOTAL.get_or_init(|| {
        prometheus::register_counter_vec!(
            prometheus::opts!(
                "billing_invoice_amount_total",
                "Total invoiced amount by merchant and currency"
            ),
            &["merchant_id", "currency"]
        )
        .expect("Failed to register INVOICE_AMOUNT_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("billing_errors_total", "Total errors by type for alerting"),
            &["error_type"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a tick's duration.
pub fn record_tick_duration(duration_secs: f64) {
    if let Some(histogram) = TICK_DURATION.get() {
        histogram.observe(duration_secs);
    }
}

/// Record one subscription's tick outcome.
pub fn record_tick_outcome(outcome: &str) {
    if let Some(counter) = TICK_OUTCOMES_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record a generated invoice.
pub fn record_invoice_generated(merchant_id: &str) {
    if let Some(counter) = INVOICES_GENERATED_TOTAL.get() {
        counter.with_label_values(&[merchant_id]).inc();
    }
}

/// Record an invoiced amount for financial tracking.
pub fn record_invoice_amount(merchant_id: &str, currency: &str, amount: f64) {
    if let Some(counter) = INVOICE_AMOUNT_TOTAL.get() {
        counter
            .with_label_values(&[merchant_id, currency])
            .inc_by(amount.abs());
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type]).inc();
    }
}
