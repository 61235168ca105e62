//! Database service for the billing engine.

use crate::models::{
    AmountOverride, CreateSubscription, InsertOutcome, Invoice, InvoiceStatus, NewInvoice,
    Subscription, SubscriptionStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::BillingStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "subscription_id, merchant_id, customer_id, title, base_amount, currency, interval_unit, interval_count, billing_anchor_utc, next_due_utc, status, max_cycles, invoice_due_days, generate_days_in_advance, past_due_after_days, merchant_timezone, fee_config, accepted_currencies, created_utc, updated_utc";

const INVOICE_COLUMNS: &str = "invoice_id, subscription_id, merchant_id, payment_request_ref, payment_url, cycle_start_utc, due_date, expires_utc, amount, currency, invoice_number, status, created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-engine"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Create a new subscription, seeded with its first due instant at the
    /// billing anchor.
    #[instrument(skip(self, input), fields(merchant_id = %input.merchant_id))]
    pub async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subscription"])
            .start_timer();

        let subscription_id = Uuid::new_v4();
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions (subscription_id, merchant_id, customer_id, title, base_amount, currency, interval_unit, interval_count, billing_anchor_utc, next_due_utc, status, max_cycles, invoice_due_days, generate_days_in_advance, past_due_after_days, merchant_timezone, fee_config, accepted_currencies)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#,
        ))
        .bind(subscription_id)
        .bind(input.merchant_id)
        .bind(input.customer_id)
        .bind(&input.title)
        .bind(input.base_amount)
        .bind(&input.currency)
        .bind(input.interval_unit.as_str())
        .bind(input.interval_count)
        .bind(input.billing_anchor_utc)
        .bind(SubscriptionStatus::Active.as_str())
        .bind(input.max_cycles)
        .bind(input.invoice_due_days)
        .bind(input.generate_days_in_advance)
        .bind(input.past_due_after_days)
        .bind(&input.merchant_timezone)
        .bind(&input.fee_config)
        .bind(&input.accepted_currencies)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create subscription: {}", e))
        })?;

        timer.observe_duration();
        info!(subscription_id = %subscription.subscription_id, "Subscription created");

        Ok(subscription)
    }

    /// Get a subscription by ID.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn get_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE subscription_id = $1
            "#,
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// Append a price override to a subscription's history.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn create_amount_override(
        &self,
        subscription_id: Uuid,
        effective_from: chrono::NaiveDate,
        amount: rust_decimal::Decimal,
    ) -> Result<AmountOverride, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_amount_override"])
            .start_timer();

        let override_id = Uuid::new_v4();
        let row = sqlx::query_as::<_, AmountOverride>(
            r#"
            INSERT INTO amount_overrides (override_id, subscription_id, effective_from, amount)
            VALUES ($1, $2, $3, $4)
            RETURNING override_id, subscription_id, effective_from, amount, created_utc
            "#,
        )
        .bind(override_id)
        .bind(subscription_id)
        .bind(effective_from)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create amount override: {}", e))
        })?;

        timer.observe_duration();

        Ok(row)
    }
}

#[async_trait]
impl BillingStore for Database {
    /// Find active subscriptions whose generation window has opened.
    #[instrument(skip(self))]
    async fn list_due_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_due_subscriptions"])
            .start_timer();

        let subscriptions = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE status = 'active'
              AND next_due_utc IS NOT NULL
              AND next_due_utc - make_interval(days => generate_days_in_advance) <= $1
            "#,
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list due subscriptions: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscriptions)
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    async fn list_overrides(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<AmountOverride>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_overrides"])
            .start_timer();

        let overrides = sqlx::query_as::<_, AmountOverride>(
            r#"
            SELECT override_id, subscription_id, effective_from, amount, created_utc
            FROM amount_overrides
            WHERE subscription_id = $1
            ORDER BY effective_from
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list overrides: {}", e))
        })?;

        timer.observe_duration();

        Ok(overrides)
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    async fn count_invoices(&self, subscription_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_invoices"])
            .start_timer();

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM invoices WHERE subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count invoices: {}", e))
        })?;

        timer.observe_duration();

        Ok(count)
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    async fn find_invoice(
        &self,
        subscription_id: Uuid,
        cycle_start_utc: DateTime<Utc>,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE subscription_id = $1 AND cycle_start_utc = $2
            "#,
        ))
        .bind(subscription_id)
        .bind(cycle_start_utc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Idempotent invoice write. Two racing ticks for the same cycle resolve
    /// here: the unique constraint lets exactly one row survive and the loser
    /// sees `Duplicate` instead of an error.
    #[instrument(skip(self, invoice), fields(subscription_id = %invoice.subscription_id))]
    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<InsertOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        let invoice_id = Uuid::new_v4();
        let inserted = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (invoice_id, subscription_id, merchant_id, payment_request_ref, payment_url, cycle_start_utc, due_date, expires_utc, amount, currency, invoice_number, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT ON CONSTRAINT uq_invoices_subscription_cycle DO NOTHING
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(invoice_id)
        .bind(invoice.subscription_id)
        .bind(invoice.merchant_id)
        .bind(&invoice.payment_request_ref)
        .bind(&invoice.payment_url)
        .bind(invoice.cycle_start_utc)
        .bind(invoice.due_date)
        .bind(invoice.expires_utc)
        .bind(invoice.amount)
        .bind(&invoice.currency)
        .bind(invoice.invoice_number)
        .bind(InvoiceStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert invoice: {}", e))
        })?;

        timer.observe_duration();

        match inserted {
            Some(row) => {
                info!(
                    invoice_id = %row.invoice_id,
                    invoice_number = row.invoice_number,
                    "Invoice created"
                );
                Ok(InsertOutcome::Inserted(row))
            }
            None => Ok(InsertOutcome::Duplicate),
        }
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    async fn advance_schedule(
        &self,
        subscription_id: Uuid,
        previous_due: DateTime<Utc>,
        next_due: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["advance_schedule"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET next_due_utc = $3, updated_utc = now()
            WHERE subscription_id = $1 AND next_due_utc = $2
            "#,
        )
        .bind(subscription_id)
        .bind(previous_due)
        .bind(next_due)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to advance schedule: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    async fn complete_subscription(&self, subscription_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["complete_subscription"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'completed', next_due_utc = NULL, updated_utc = now()
            WHERE subscription_id = $1 AND status = 'active'
            "#,
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to complete subscription: {}", e))
        })?;

        timer.observe_duration();

        let first_writer = result.rows_affected() == 1;
        if first_writer {
            info!(subscription_id = %subscription_id, "Subscription completed");
        }

        Ok(first_writer)
    }

    #[instrument(skip(self), fields(merchant_id = %merchant_id))]
    async fn next_invoice_number(&self, merchant_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["next_invoice_number"])
            .start_timer();

        let number: i64 = sqlx::query_scalar("SELECT next_invoice_number($1)")
            .bind(merchant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice number: {}", e))
            })?;

        timer.observe_duration();

        Ok(number)
    }
}
