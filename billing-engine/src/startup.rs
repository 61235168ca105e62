//! Application startup and lifecycle management.

use crate::config::EngineConfig;
use crate::engine::BillingEngine;
use crate::services::{
    get_metrics, init_metrics, Database, NotificationApiClient, PaymentApiClient, PaymentApiConfig,
};
use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use engine_core::error::AppError;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "billing-engine",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "billing-engine",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing the scheduler and probe server.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    db: Arc<Database>,
    engine: Arc<BillingEngine>,
    tick_interval: Duration,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: EngineConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the harness.
    pub async fn build_without_migrations(config: EngineConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: EngineConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);

        let payments = PaymentApiClient::new(PaymentApiConfig {
            base_url: config.payment_service.url.clone(),
            api_key: config.payment_service.api_key.clone(),
            request_timeout: Duration::from_secs(config.payment_service.request_timeout_secs),
        })
        .map_err(AppError::InternalError)?;

        let notifier = NotificationApiClient::new(
            config.notification_service.url.clone(),
            Duration::from_secs(config.notification_service.request_timeout_secs),
        )
        .map_err(AppError::InternalError)?;

        let engine = Arc::new(BillingEngine::new(
            db.clone(),
            Arc::new(payments),
            Arc::new(notifier),
            config.scheduler.concurrency,
        ));

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(
            http_port = http_port,
            tick_interval_secs = config.scheduler.tick_interval_secs,
            "Billing engine listener bound"
        );

        Ok(Self {
            http_port,
            http_listener,
            db,
            engine,
            tick_interval: Duration::from_secs(config.scheduler.tick_interval_secs),
        })
    }

    /// Get the HTTP port the probe server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get a handle to the engine, e.g. for a one-off manual tick.
    pub fn engine(&self) -> Arc<BillingEngine> {
        self.engine.clone()
    }

    /// Run the probe server and the billing scheduler until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let health_state = HealthState {
            db: self.db.clone(),
        };

        let http_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(health_state);

        let engine = self.engine.clone();
        let tick_interval = self.tick_interval;
        let scheduler = async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                // Failures are contained per subscription inside the tick; an
                // error here means even listing candidates failed. The next
                // interval is the retry.
                if let Err(e) = engine.run_tick().await {
                    tracing::error!(error = %e, "Billing tick aborted");
                }
            }
        };

        tracing::info!(
            service = "billing-engine",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Engine ready"
        );

        tokio::select! {
            result = axum::serve(self.http_listener, http_router) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "HTTP server error");
                    return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
                }
            }
            _ = scheduler => {}
        }

        Ok(())
    }
}
