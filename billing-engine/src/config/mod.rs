//! Configuration module for the billing engine.

use engine_core::config as core_config;
use engine_core::error::AppError;
use secrecy::Secret;
use std::env;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub payment_service: PaymentServiceConfig,
    pub notification_service: NotificationServiceConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct PaymentServiceConfig {
    pub url: String,
    pub api_key: Secret<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct NotificationServiceConfig {
    pub url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cadence of the billing tick.
    pub tick_interval_secs: u64,
    /// How many subscriptions one tick processes concurrently.
    pub concurrency: usize,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "billing-engine".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            payment_service: PaymentServiceConfig {
                url: env::var("PAYMENT_SERVICE_URL")
                    .unwrap_or_else(|_| "http://payment-service:3001".to_string()),
                api_key: Secret::new(env::var("PAYMENT_SERVICE_API_KEY").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("PAYMENT_SERVICE_API_KEY is required"))
                })?),
                request_timeout_secs: env::var("PAYMENT_SERVICE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            notification_service: NotificationServiceConfig {
                url: env::var("NOTIFICATION_SERVICE_URL")
                    .unwrap_or_else(|_| "http://notification-service:3001".to_string()),
                request_timeout_secs: env::var("NOTIFICATION_SERVICE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            },
            scheduler: SchedulerConfig {
                tick_interval_secs: env::var("BILLING_TICK_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
                concurrency: env::var("BILLING_TICK_CONCURRENCY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8),
            },
        })
    }
}
